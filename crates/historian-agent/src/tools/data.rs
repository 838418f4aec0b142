//! Data workflow tools. Each question moves through four tracked steps:
//! generate SQL → execute SQL → generate plot spec → create chart figure.

use chrono::Local;
use historian_artifact::Artifact;
use historian_core::observability;
use historian_data::chart::{chart_html, chart_url, render_plot};
use historian_data::sql::validate_read_only;
use historian_data::{PlotSpec, QueryResult};
use serde_json::{json, Value};

use super::{error_handler, required_str, str_arg, ToolContext};
use crate::tracker::{
    utc_timestamp, Conversation, FigureCreated, PlotCodeGenerated, SqlExecuted, SqlGenerated,
    StepUpdate,
};
use crate::types::{ToolDefinition, ToolResult};

const PREVIEW_ROWS: usize = 10;

pub(super) fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "generate_sql_query",
            "Generate a read-only SQL query for a question about the historian database. Always starts a new conversation; the returned text carries its id.",
            json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The user's question in natural language"
                    },
                    "allow_llm_to_see_data": {
                        "type": "boolean",
                        "description": "Allow an intermediate query that inspects distinct values (e.g. tag names) before writing the final SQL. Default: false"
                    }
                },
                "required": ["question"]
            }),
        ),
        ToolDefinition::function(
            "execute_sql_query",
            "Run the SQL of the current conversation against the historian database. Returns the row count, columns and a preview of the first 10 rows.",
            json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "Read-only SQL (SELECT or WITH) returned by generate_sql_query"
                    }
                },
                "required": ["sql"]
            }),
        ),
        ToolDefinition::function(
            "generate_plot_code",
            "Generate a chart specification (JSON) for the executed query of the current conversation. Only call when the user asks for a chart, plot or graph.",
            json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "The question the chart should answer" },
                    "sql": { "type": "string", "description": "The executed SQL query" }
                },
                "required": ["question", "sql"]
            }),
        ),
        ToolDefinition::function(
            "create_chart_figure",
            "Render the chart specification of the current conversation from the stored query results and save it as an HTML artifact.",
            json!({
                "type": "object",
                "properties": {
                    "plot_code": { "type": "string", "description": "Chart specification JSON returned by generate_plot_code" },
                    "sql": { "type": "string", "description": "The executed SQL query" }
                },
                "required": ["plot_code", "sql"]
            }),
        ),
        ToolDefinition::function(
            "explain_sql_query",
            "Explain in plain language what a SQL query does.",
            json!({
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "description": "The SQL query to explain" }
                },
                "required": ["sql"]
            }),
        ),
    ]
}

pub(super) fn is_data_tool(name: &str) -> bool {
    matches!(
        name,
        "generate_sql_query"
            | "execute_sql_query"
            | "generate_plot_code"
            | "create_chart_figure"
            | "explain_sql_query"
    )
}

pub(super) async fn execute(tool_name: &str, args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    match tool_name {
        "generate_sql_query" => generate_sql_query(args, ctx).await,
        "execute_sql_query" => execute_sql_query(args, ctx).await,
        "generate_plot_code" => generate_plot_code(args, ctx).await,
        "create_chart_figure" => create_chart_figure(args, ctx).await,
        "explain_sql_query" => explain_sql_query(args, ctx).await,
        _ => ToolResult::error(tool_name, format!("Unknown data tool: {}", tool_name)),
    }
}

async fn generate_sql_query(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    const NAME: &str = "generate_sql_query";
    let question = match required_str(args, "question") {
        Ok(q) => q,
        Err(msg) => return ToolResult::error(NAME, msg),
    };
    let allow_llm_to_see_data = args
        .get("allow_llm_to_see_data")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let conv_id = ctx.tracker().start_new_conversation(question);
    tracing::info!(conversation = %conv_id, "Started new conversation");

    match ctx
        .services
        .generator
        .generate_sql(question, allow_llm_to_see_data)
        .await
    {
        Ok(sql) => {
            ctx.tracker().update_step(
                StepUpdate::SqlGenerated(SqlGenerated {
                    sql: sql.clone(),
                    timestamp: utc_timestamp(),
                }),
                Some(&conv_id),
            );
            ToolResult::ok(
                NAME,
                format!(
                    "[Conversation {}]\n\nGenerated SQL query:\n\n```sql\n{}\n```\n\nUse `execute_sql_query` to run this query.",
                    conv_id, sql
                ),
            )
        }
        Err(e) => {
            let envelope = error_handler::respond::<()>(NAME, Err(e.into()));
            ToolResult::error(NAME, format!("Error generating SQL: {}", envelope.content))
        }
    }
}

async fn execute_sql_query(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    const NAME: &str = "execute_sql_query";
    let Some(conversation) = ctx.tracker().get_current_conversation() else {
        return ToolResult::error(
            NAME,
            "Error: No active conversation. Please generate SQL first using `generate_sql_query`.",
        );
    };
    let sql = match required_str(args, "sql") {
        Ok(s) => s,
        Err(msg) => return ToolResult::error(NAME, msg),
    };
    tracing::info!(conversation = %conversation.id, "Executing SQL");

    let outcome = match validate_read_only(sql) {
        Ok(checked) => ctx.services.historian.execute_query(&checked, &[]).await,
        Err(e) => Err(e.into()),
    };
    let result = match outcome {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(conversation = %conversation.id, "SQL execution failed: {}", e);
            return ToolResult::error(
                NAME,
                format!("Error executing SQL query: {}\n\nSQL Query:\n{}", e, sql),
            );
        }
    };

    observability::audit_sql_executed(&conversation.id, sql, result.row_count, result.execution_time_ms);
    let preview = result.preview(PREVIEW_ROWS);
    let content = format!(
        "[Conversation {}]\n\nQuery executed successfully!\n\nRows returned: {}\nColumns: {}\n\nPreview (first {} rows):\n{}",
        conversation.id,
        result.row_count,
        result.columns.join(", "),
        PREVIEW_ROWS,
        preview
    );
    ctx.tracker().update_step(
        StepUpdate::SqlExecuted(SqlExecuted {
            sql: sql.to_string(),
            row_count: result.row_count,
            columns: result.columns,
            rows: result.rows,
            execution_time_ms: result.execution_time_ms,
            timestamp: utc_timestamp(),
        }),
        Some(&conversation.id),
    );
    ToolResult::ok(NAME, content)
}

/// Stored step-2 rows as a query result.
fn executed_result(step: &SqlExecuted) -> QueryResult {
    QueryResult {
        columns: step.columns.clone(),
        rows: step.rows.clone(),
        row_count: step.row_count,
        execution_time_ms: step.execution_time_ms,
    }
}

async fn generate_plot_code(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    const NAME: &str = "generate_plot_code";
    let Some(conversation) = ctx.tracker().get_current_conversation() else {
        return ToolResult::error(
            NAME,
            "Error: No active conversation. Please execute SQL first using `execute_sql_query`.",
        );
    };
    let Some(ref executed) = conversation.steps.sql_executed else {
        return ToolResult::error(
            NAME,
            "Error: SQL must be executed before generating plot code. Use `execute_sql_query` first.",
        );
    };
    let question = str_arg(args, "question").unwrap_or(conversation.question.as_str());
    let sql = str_arg(args, "sql").unwrap_or(executed.sql.as_str());
    tracing::info!(conversation = %conversation.id, "Generating plot spec");

    let result = executed_result(executed);
    match ctx
        .services
        .generator
        .generate_plot_spec(question, sql, &result)
        .await
    {
        Ok(spec) => {
            let plot_code = spec.to_json();
            ctx.tracker().update_step(
                StepUpdate::PlotCodeGenerated(PlotCodeGenerated {
                    plot_code: plot_code.clone(),
                    question: question.to_string(),
                    sql: sql.to_string(),
                    timestamp: utc_timestamp(),
                }),
                Some(&conversation.id),
            );
            ToolResult::ok(
                NAME,
                format!(
                    "[Conversation {}]\n\nGenerated chart specification:\n\n```json\n{}\n```\n\nUse `create_chart_figure` to generate the chart.",
                    conversation.id, plot_code
                ),
            )
        }
        Err(e) => ToolResult::error(NAME, format!("Error generating plot code: {}", e)),
    }
}

/// Spec passed by the model, or the one stored in step 3.
fn resolve_spec(args: &Value, stored: &PlotCodeGenerated) -> historian_data::Result<PlotSpec> {
    let text = str_arg(args, "plot_code").unwrap_or(stored.plot_code.as_str());
    let text = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```");
    match PlotSpec::from_json(text) {
        Ok(spec) => Ok(spec),
        Err(e) if text != stored.plot_code => {
            tracing::warn!("Ignoring unparsable plot_code argument ({}); using stored spec", e);
            PlotSpec::from_json(&stored.plot_code)
        }
        Err(e) => Err(e),
    }
}

async fn render_and_save(
    ctx: &ToolContext<'_>,
    conversation: &Conversation,
    spec: &PlotSpec,
    result: &QueryResult,
) -> anyhow::Result<(String, u32, String)> {
    let config = render_plot(spec, result)?;
    let opts = &ctx.services.chart_options;
    let url = chart_url(&config, opts)?;
    let title = spec.title.as_deref().unwrap_or(conversation.question.as_str());
    let html = chart_html(&url, title, opts.width, opts.height);

    let filename = format!(
        "chart_{}_{}.html",
        conversation.id,
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let version = ctx.save_artifact(&filename, Artifact::html(&html)).await?;
    Ok((filename, version, url))
}

async fn create_chart_figure(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    const NAME: &str = "create_chart_figure";
    let Some(conversation) = ctx.tracker().get_current_conversation() else {
        return ToolResult::error(
            NAME,
            "Error: No active conversation. Please complete previous steps first.",
        );
    };
    let Some(ref executed) = conversation.steps.sql_executed else {
        return ToolResult::error(
            NAME,
            "Error: SQL must be executed before creating figure. Use `execute_sql_query` first.",
        );
    };
    let Some(ref planned) = conversation.steps.plot_code_generated else {
        return ToolResult::error(
            NAME,
            "Error: Plot code must be generated before creating figure. Use `generate_plot_code` first.",
        );
    };
    tracing::info!(conversation = %conversation.id, "Creating chart figure");

    let result = executed_result(executed);
    let outcome = match resolve_spec(args, planned) {
        Ok(spec) => render_and_save(ctx, &conversation, &spec, &result).await,
        Err(e) => Err(e.into()),
    };
    let (filename, version, url) = match outcome {
        Ok(saved) => saved,
        Err(e) => {
            return ToolResult::error(
                NAME,
                format!(
                    "Error generating figure: {}\n\nPlease check the query and plot code.",
                    e
                ),
            );
        }
    };

    let sql_used = str_arg(args, "sql").unwrap_or(executed.sql.as_str()).to_string();
    let mut tracker = ctx.tracker();
    tracker.set_artifact(&conversation.id, &filename);
    tracker.update_step(
        StepUpdate::FigureCreated(FigureCreated {
            filename: filename.clone(),
            version,
            timestamp: utc_timestamp(),
            sql_used,
            chart_url: url.clone(),
        }),
        Some(&conversation.id),
    );

    ToolResult::ok(
        NAME,
        format!(
            "✅ [Conversation {}] Chart created and saved as artifact '{}' (version {}).\nChart URL: {}",
            conversation.id, filename, version, url
        ),
    )
}

async fn explain_sql_query(args: &Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    const NAME: &str = "explain_sql_query";
    let sql = match required_str(args, "sql") {
        Ok(s) => s,
        Err(msg) => return ToolResult::error(NAME, msg),
    };
    match ctx.services.generator.explain_sql(sql).await {
        Ok(text) => ToolResult::ok(NAME, text),
        Err(e) => ToolResult::error(NAME, format!("Error explaining SQL: {}", e)),
    }
}
