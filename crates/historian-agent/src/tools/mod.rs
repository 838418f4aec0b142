//! Agent tools and the registry that dispatches them.
//!
//! Tool modules:
//! - `data`:          generate_sql_query, execute_sql_query, generate_plot_code,
//!                    create_chart_figure, explain_sql_query (tracker-driven workflow)
//! - `database`:      execute_query (raw read-only SQL, `ResponseDto` envelope)
//! - `reporting`:     analyze_results, generate_report
//! - `visualization`: create_bar_chart, create_line_chart, create_pie_chart,
//!                    create_time_series_chart
//!
//! `transfer_to_agent` is defined in [`crate::agents`] and handled by the agent loop.

mod data;
mod database;
pub mod error_handler;
mod reporting;
mod visualization;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use historian_artifact::{Artifact, ArtifactScope, ArtifactStore};
use historian_core::observability;
use historian_data::{ChartOptions, HistorianRepository, SqlGenerator};
use serde_json::{Map, Value};

use crate::tracker::ConversationTracker;
use crate::types::{safe_truncate, ToolDefinition, ToolResult};

/// Long-lived backends shared by every tool call.
pub struct Services {
    pub historian: Arc<dyn HistorianRepository>,
    pub generator: Arc<SqlGenerator>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub chart_options: ChartOptions,
}

impl Services {
    pub fn new(
        historian: Arc<dyn HistorianRepository>,
        generator: Arc<SqlGenerator>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            historian,
            generator,
            artifacts,
            chart_options: ChartOptions::default(),
        }
    }
}

/// Per-call view of the session a tool runs in.
pub struct ToolContext<'a> {
    pub services: &'a Services,
    pub scope: &'a ArtifactScope,
    pub state: &'a mut Map<String, Value>,
}

impl<'a> ToolContext<'a> {
    pub fn new(services: &'a Services, scope: &'a ArtifactScope, state: &'a mut Map<String, Value>) -> Self {
        Self {
            services,
            scope,
            state,
        }
    }

    pub fn tracker(&mut self) -> ConversationTracker<'_> {
        ConversationTracker::new(self.state)
    }

    /// Save an artifact in this session's scope. Stores audit the write.
    pub async fn save_artifact(
        &self,
        filename: &str,
        artifact: Artifact,
    ) -> historian_artifact::Result<u32> {
        let version = self
            .services
            .artifacts
            .save(self.scope, filename, artifact)
            .await?;
        tracing::info!(filename, version, "artifact saved");
        Ok(version)
    }
}

/// Registry of the tools available to the agents.
///
/// ```ignore
/// let registry = ToolRegistry::builder()
///     .register(data_tools())
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tool_definitions: Vec<ToolDefinition>,
}

#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    tool_definitions: Vec<ToolDefinition>,
}

impl ToolRegistryBuilder {
    /// Register tool definitions from one tool module.
    #[must_use]
    pub fn register(mut self, defs: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.tool_definitions.extend(defs);
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tool_definitions: self.tool_definitions,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Every historian tool.
    pub fn new() -> Self {
        Self::builder()
            .register(data::tool_definitions())
            .register(database::tool_definitions())
            .register(reporting::tool_definitions())
            .register(visualization::tool_definitions())
            .build()
    }

    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn all_tool_definitions(&self) -> &[ToolDefinition] {
        &self.tool_definitions
    }

    /// Definitions for `names`, in that order; unknown names are skipped.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tool_definitions.iter().find(|d| d.name() == *n))
            .cloned()
            .collect()
    }

    pub fn owns_tool(&self, name: &str) -> bool {
        self.tool_definitions.iter().any(|d| d.name() == name)
    }

    /// Execute a tool by name. Never fails: errors come back as an error result.
    pub async fn execute(&self, tool_name: &str, arguments: &str, ctx: &mut ToolContext<'_>) -> ToolResult {
        if !self.owns_tool(tool_name) {
            return ToolResult::error(tool_name, format!("Unknown tool: {}", tool_name));
        }

        let args: Value = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str(arguments) {
                Ok(v) => v,
                Err(e) => {
                    return ToolResult::error(tool_name, format!("Invalid arguments JSON: {}", e));
                }
            }
        };

        let start = Instant::now();
        let result = if data::is_data_tool(tool_name) {
            data::execute(tool_name, &args, ctx).await
        } else if database::is_database_tool(tool_name) {
            database::execute(tool_name, args, ctx).await
        } else if reporting::is_reporting_tool(tool_name) {
            reporting::execute(tool_name, args, ctx).await
        } else if visualization::is_visualization_tool(tool_name) {
            visualization::execute(tool_name, args, ctx).await
        } else {
            ToolResult::error(tool_name, format!("Unknown tool: {}", tool_name))
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(tool = tool_name, duration_ms, is_error = result.is_error, "tool finished");
        observability::audit_tool_invoked(&ctx.scope.session_id, tool_name, !result.is_error, duration_ms);
        result
    }
}

// ─── Argument helpers ───────────────────────────────────────────────────────

fn str_arg<'v>(args: &'v Value, key: &str) -> Option<&'v str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn required_str<'v>(args: &'v Value, key: &str) -> Result<&'v str, String> {
    str_arg(args, key).ok_or_else(|| format!("Error: Missing required parameter '{}'", key))
}

// ─── Long content handling ──────────────────────────────────────────────────

/// Cap a tool result at `max_chars` bytes of content (plus the omission
/// marker): two thirds from the head, one third from the tail.
pub fn process_tool_result_content(content: &str, max_chars: usize) -> String {
    let len = content.len();
    if len <= max_chars {
        return content.to_string();
    }
    let tail_budget = max_chars / 3;
    let head = safe_truncate(content, max_chars - tail_budget);
    let mut tail_start = len.saturating_sub(tail_budget).max(head.len());
    while tail_start < len && !content.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    format!(
        "{}\n\n[... {} chars omitted ...]\n\n{}",
        head,
        tail_start - head.len(),
        &content[tail_start..]
    )
}
