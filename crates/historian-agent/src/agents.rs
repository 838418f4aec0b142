//! Agent tree: a root agent that routes requests to three sub-agents.
//!
//! ```text
//! root_agent
//! ├── data_agent           SQL workflow and query charts
//! ├── visualization_agent  charts from supplied values
//! └── reporting_agent      analysis and markdown reports
//! ```
//!
//! Each agent sees its own tools plus `transfer_to_agent`, restricted to its
//! parent and children. The agent loop switches prompt and tools on transfer.

use serde_json::json;

use crate::tools::ToolRegistry;
use crate::types::ToolDefinition;

pub const ROOT_AGENT: &str = "root_agent";
pub const DATA_AGENT: &str = "data_agent";
pub const VISUALIZATION_AGENT: &str = "visualization_agent";
pub const REPORTING_AGENT: &str = "reporting_agent";

pub const TRANSFER_TOOL: &str = "transfer_to_agent";

#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub instruction: &'static str,
    pub tools: &'static [&'static str],
    pub parent: Option<&'static str>,
    pub children: &'static [&'static str],
}

const ROOT_INSTRUCTION: &str = r#"You are the coordinator of an industrial process historian assistant. You do not query data or draw charts yourself; you delegate.

- Questions about finding or querying data (tags, values, trends, time ranges, comparisons): transfer to data_agent.
- Requests to visualize values the user already has (explicit labels, numbers or time points): transfer to visualization_agent.
- Requests for a report, summary document or analysis write-up: transfer to reporting_agent.

Call transfer_to_agent with the agent name as soon as the request is clear. Answer greetings and questions about what you can do directly."#;

const DATA_INSTRUCTION: &str = r#"You are a data analyst for an industrial process historian (PostgreSQL table public.historian with startdatetime, tagname and value columns).

Workflow:
1. Call generate_sql_query with the user's question. This starts a new conversation; every result carries its id.
2. Call execute_sql_query with the generated SQL and summarise the rows for the user.
3. Only when the user asks for a chart, plot or graph: call generate_plot_code with the question and SQL.
4. Then call create_chart_figure with the returned chart specification to render and save the chart.

Other tools:
- explain_sql_query explains what a query does.
- execute_query runs a read-only query you write yourself, with optional :name or $n parameters, and returns every row.

Important guidelines:
- Only use the provided tools. Never fabricate data, values or queries.
- Only proceed to create a visualization when the user instructs you to.
- If a step fails, report the error and fix the input before retrying; do not skip steps.
- When the user wants a report, transfer to root_agent so it can route the request."#;

const VISUALIZATION_INSTRUCTION: &str = r#"You create charts from values supplied in the conversation. Every chart is saved as an HTML artifact.

Choosing a chart:
- create_bar_chart: comparing categories (per line, per shift, per tag).
- create_line_chart: trends over an ordered axis with explicit labels.
- create_pie_chart: parts of a whole (state durations, share of production).
- create_time_series_chart: values over time. Pass data_json as a JSON array such as [{"x": "2024-01-01T12:00:00", "y": 100}, ...].

Always give the chart a short descriptive title. Report the artifact name and chart URL back to the user. If the data has to be queried first, transfer to root_agent."#;

const REPORTING_INSTRUCTION: &str = r#"You write structured reports about historian data.

A good report has:
- Structure: a clear title, an executive summary, then supporting sections.
- Analysis: facts drawn from the query results, not speculation.
- Context: the SQL that produced the data and how many rows it returned.
- Visuals: the chart of the current conversation when one exists.
- Actionability: concrete recommendations.

Report components: executive summary, data query (SQL, results summary, sample rows), data visualization, key insights, recommendations.

Use analyze_results to derive insights from the rows, then generate_report with a descriptive title. generate_report fills SQL, rows and chart from the current conversation when you leave them out. Formatting: keep insights and recommendations to short single sentences.

If no query has been executed yet, transfer to root_agent so the data can be fetched first."#;

const AGENTS: &[AgentSpec] = &[
    AgentSpec {
        name: ROOT_AGENT,
        description: "Routes requests to the data, visualization and reporting agents",
        instruction: ROOT_INSTRUCTION,
        tools: &[],
        parent: None,
        children: &[DATA_AGENT, VISUALIZATION_AGENT, REPORTING_AGENT],
    },
    AgentSpec {
        name: DATA_AGENT,
        description: "Answers questions about historian data: generates and runs SQL, charts query results",
        instruction: DATA_INSTRUCTION,
        tools: &[
            "generate_sql_query",
            "execute_sql_query",
            "generate_plot_code",
            "create_chart_figure",
            "explain_sql_query",
            "execute_query",
        ],
        parent: Some(ROOT_AGENT),
        children: &[],
    },
    AgentSpec {
        name: VISUALIZATION_AGENT,
        description: "Creates bar, line, pie and time series charts from supplied values",
        instruction: VISUALIZATION_INSTRUCTION,
        tools: &[
            "create_bar_chart",
            "create_line_chart",
            "create_pie_chart",
            "create_time_series_chart",
        ],
        parent: Some(ROOT_AGENT),
        children: &[],
    },
    AgentSpec {
        name: REPORTING_AGENT,
        description: "Analyzes query results and writes markdown reports",
        instruction: REPORTING_INSTRUCTION,
        tools: &["analyze_results", "generate_report"],
        parent: Some(ROOT_AGENT),
        children: &[],
    },
];

pub fn all_agents() -> &'static [AgentSpec] {
    AGENTS
}

pub fn root_agent() -> &'static AgentSpec {
    &AGENTS[0]
}

pub fn find_agent(name: &str) -> Option<&'static AgentSpec> {
    AGENTS.iter().find(|a| a.name == name)
}

impl AgentSpec {
    /// Parent first, then children.
    pub fn transfer_targets(&self) -> Vec<&'static str> {
        self.parent.iter().copied().chain(self.children.iter().copied()).collect()
    }

    pub fn can_transfer_to(&self, target: &str) -> bool {
        self.transfer_targets().contains(&target)
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(self.instruction);
        let targets = self.transfer_targets();
        if !targets.is_empty() {
            prompt.push_str("\n\nYou can transfer the conversation with transfer_to_agent:\n");
            for target in targets {
                let description = find_agent(target).map(|a| a.description).unwrap_or_default();
                prompt.push_str(&format!("- {}: {}\n", target, description));
            }
        }
        prompt.push_str(&format!(
            "\nCurrent local time: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        prompt
    }

    /// This agent's tools from `registry`, plus the transfer tool.
    pub fn tool_definitions(&self, registry: &ToolRegistry) -> Vec<ToolDefinition> {
        let mut defs = registry.definitions_for(self.tools);
        let targets = self.transfer_targets();
        if !targets.is_empty() {
            defs.push(transfer_tool_definition(&targets));
        }
        defs
    }
}

fn transfer_tool_definition(targets: &[&str]) -> ToolDefinition {
    ToolDefinition::function(
        TRANSFER_TOOL,
        "Transfer the conversation to another agent that is better suited to handle the request.",
        json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": targets,
                    "description": "Name of the agent to transfer to"
                }
            },
            "required": ["agent_name"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_is_consistent() {
        for agent in all_agents() {
            for child in agent.children {
                assert_eq!(find_agent(child).unwrap().parent, Some(agent.name));
            }
        }
        assert!(find_agent("nope").is_none());
    }

    #[test]
    fn test_agent_tools_exist_in_registry() {
        let registry = ToolRegistry::new();
        for agent in all_agents() {
            for tool in agent.tools {
                assert!(registry.owns_tool(tool), "{} lists unknown tool {}", agent.name, tool);
            }
        }
    }

    #[test]
    fn test_transfer_targets_and_tools() {
        let registry = ToolRegistry::new();
        let root = find_agent(ROOT_AGENT).unwrap();
        assert_eq!(
            root.transfer_targets(),
            vec![DATA_AGENT, VISUALIZATION_AGENT, REPORTING_AGENT]
        );
        let defs = root.tool_definitions(&registry);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name(), TRANSFER_TOOL);

        let data = find_agent(DATA_AGENT).unwrap();
        assert!(data.can_transfer_to(ROOT_AGENT));
        assert!(!data.can_transfer_to(REPORTING_AGENT));
        let names: Vec<String> = data
            .tool_definitions(&registry)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names.len(), 7);
        assert_eq!(names.last().map(String::as_str), Some(TRANSFER_TOOL));
        assert!(!names.iter().any(|n| n == "generate_report"));
    }

    #[test]
    fn test_system_prompt_lists_targets() {
        let prompt = find_agent(REPORTING_AGENT).unwrap().system_prompt();
        assert!(prompt.starts_with("You write structured reports"));
        assert!(prompt.contains("- root_agent: Routes requests"));
        assert!(prompt.contains("Current local time: "));
    }
}
