//! Reporting tools: result analysis and markdown report generation.

use historian_artifact::Artifact;
use historian_core::ResponseDto;
use historian_data::report::{analyze_results, analyze_sql_results, default_recommendations, generate_report};
use historian_data::{Analysis, PlotSpec, ReportRequest, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{error_handler, ToolContext};
use crate::types::{ToolDefinition, ToolResult};

pub(super) fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "analyze_results",
            "Analyze SQL query results: record and column counts, numeric columns and basic statistics. Pass the rows, or set use_current_conversation to analyze the rows of the last executed query.",
            json!({
                "type": "object",
                "properties": {
                    "sql_results": {
                        "type": "array",
                        "items": { "type": "object" },
                        "description": "Query result rows, one object per row"
                    },
                    "context": {
                        "type": "string",
                        "description": "What the analysis should focus on"
                    },
                    "use_current_conversation": {
                        "type": "boolean",
                        "description": "Use the rows of the current conversation when sql_results is omitted. Default: true"
                    }
                }
            }),
        ),
        ToolDefinition::function(
            "generate_report",
            "Generate a structured markdown report (executive summary, data overview, visualization, insights, recommendations, technical details) and save it as an artifact. Missing SQL, results and chart are taken from the current conversation.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Report title" },
                    "sql_query": { "type": "string", "description": "SQL query behind the report" },
                    "sql_results": {
                        "type": "array",
                        "items": { "type": "object" },
                        "description": "Query result rows"
                    },
                    "sql_row_count": { "type": "integer", "description": "Total number of rows returned" },
                    "chart_url": { "type": "string", "description": "URL of a chart image to embed" },
                    "chart_type": { "type": "string", "description": "Chart type, e.g. bar or line" },
                    "chart_title": { "type": "string", "description": "Chart title" },
                    "summary": { "type": "string", "description": "Executive summary" },
                    "insights": { "type": "array", "items": { "type": "string" }, "description": "Key insights" },
                    "recommendations": { "type": "array", "items": { "type": "string" }, "description": "Recommendations" },
                    "execution_time_ms": { "type": "number", "description": "Query execution time in milliseconds" },
                    "use_current_conversation": {
                        "type": "boolean",
                        "description": "Fill missing fields from the current conversation. Default: true"
                    }
                },
                "required": ["title"]
            }),
        ),
    ]
}

pub(super) fn is_reporting_tool(name: &str) -> bool {
    matches!(name, "analyze_results" | "generate_report")
}

pub(super) async fn execute(tool_name: &str, args: Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    match tool_name {
        "analyze_results" => error_handler::respond(tool_name, analyze(args, ctx)),
        "generate_report" => match report(args, ctx).await {
            Ok(envelope) => ToolResult::ok(tool_name, envelope.to_json_string()),
            Err(e) => error_handler::respond::<()>(tool_name, Err(e)),
        },
        _ => ToolResult::error(tool_name, format!("Unknown reporting tool: {}", tool_name)),
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    #[serde(default)]
    sql_results: Option<Vec<Row>>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default = "default_true")]
    use_current_conversation: bool,
}

fn current_rows(ctx: &mut ToolContext<'_>) -> Option<Vec<Row>> {
    ctx.tracker()
        .get_current_conversation()
        .and_then(|c| c.steps.sql_executed)
        .map(|s| s.rows)
}

fn analyze(args: Value, ctx: &mut ToolContext<'_>) -> anyhow::Result<Analysis> {
    let args: AnalyzeArgs = serde_json::from_value(args)?;
    let rows = match args.sql_results {
        Some(rows) => rows,
        None if args.use_current_conversation => current_rows(ctx).unwrap_or_default(),
        None => Vec::new(),
    };
    Ok(analyze_sql_results(&rows, args.context.as_deref().unwrap_or_default())?)
}

#[derive(Debug, Deserialize)]
struct GenerateReportArgs {
    #[serde(flatten)]
    request: ReportRequest,
    #[serde(default = "default_true")]
    use_current_conversation: bool,
}

/// Fill what the caller left out from the current conversation.
fn fill_from_conversation(req: &mut ReportRequest, ctx: &mut ToolContext<'_>) {
    let Some(conversation) = ctx.tracker().get_current_conversation() else {
        return;
    };
    let steps = conversation.steps;
    if let Some(executed) = steps.sql_executed {
        req.sql_query.get_or_insert(executed.sql);
        req.sql_row_count.get_or_insert(executed.row_count);
        req.execution_time_ms.get_or_insert(executed.execution_time_ms);
        req.sql_results.get_or_insert(executed.rows);
    } else if let Some(generated) = steps.sql_generated {
        req.sql_query.get_or_insert(generated.sql);
    }
    if let Some(planned) = steps.plot_code_generated {
        if let Ok(spec) = PlotSpec::from_json(&planned.plot_code) {
            req.chart_type.get_or_insert_with(|| spec.chart_type.as_str().to_string());
            if let Some(title) = spec.title {
                req.chart_title.get_or_insert(title);
            }
        }
    }
    if let Some(figure) = steps.figure_created {
        req.chart_url.get_or_insert(figure.chart_url);
    }
}

fn report_artifact_name(title: &str) -> String {
    let slug: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("report_{}.md", slug)
}

async fn report(args: Value, ctx: &mut ToolContext<'_>) -> anyhow::Result<ResponseDto<Value>> {
    let args: GenerateReportArgs = serde_json::from_value(args)?;
    let mut req = args.request;
    if args.use_current_conversation {
        fill_from_conversation(&mut req, ctx);
    }
    if req.summary.is_none() || req.insights.is_none() {
        if let Some(rows) = req.sql_results.as_deref().filter(|r| !r.is_empty()) {
            let analysis = analyze_results(rows, &req.title);
            req.summary.get_or_insert(analysis.summary);
            req.insights.get_or_insert(analysis.insights);
        }
    }
    req.recommendations.get_or_insert_with(default_recommendations);

    let markdown = generate_report(&req)?;
    let filename = report_artifact_name(&req.title);
    let metadata = match ctx.save_artifact(&filename, Artifact::markdown(&markdown)).await {
        Ok(version) => json!({ "artifact": filename, "version": version }),
        Err(e) => {
            tracing::warn!("Failed to save report artifact {}: {}", filename, e);
            json!({ "artifact_error": e.to_string() })
        }
    };
    Ok(ResponseDto::success(json!({ "report": markdown })).with_metadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_artifact_name() {
        assert_eq!(report_artifact_name("Temperature Report"), "report_temperature_report.md");
        assert_eq!(report_artifact_name("Flow/Pressure: Q1"), "report_flow_pressure__q1.md");
    }

    #[test]
    fn test_report_args_flatten_request() {
        let args: GenerateReportArgs = serde_json::from_value(json!({
            "title": "Daily",
            "sql_row_count": 3,
            "use_current_conversation": false
        }))
        .unwrap();
        assert_eq!(args.request.title, "Daily");
        assert_eq!(args.request.sql_row_count, Some(3));
        assert!(!args.use_current_conversation);

        let args: GenerateReportArgs = serde_json::from_value(json!({"title": "x"})).unwrap();
        assert!(args.use_current_conversation);
    }
}
