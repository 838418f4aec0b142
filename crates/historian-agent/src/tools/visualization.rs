//! Direct chart tools: the model supplies labels and values, no query involved.

use historian_artifact::Artifact;
use historian_data::chart::{
    bar_chart, chart_artifact_name, chart_html, chart_url, line_chart, pie_chart, time_series_chart,
};
use historian_data::ChartConfig;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ToolContext;
use crate::types::{ToolDefinition, ToolResult};

const TIME_SERIES_FORMAT_ERROR: &str =
    r#"Error: Invalid JSON format for data_json. Expected format: [{"x": "timestamp", "y": value}, ...]"#;

pub(super) fn tool_definitions() -> Vec<ToolDefinition> {
    let datasets_schema = json!({
        "type": "array",
        "items": { "type": "object" },
        "description": "Chart.js datasets, e.g. [{\"label\": \"Temperature\", \"data\": [21.5, 22.1]}]"
    });
    vec![
        ToolDefinition::function(
            "create_bar_chart",
            "Create a bar chart for comparing categories and save it as an HTML artifact.",
            json!({
                "type": "object",
                "properties": {
                    "labels": { "type": "array", "items": { "type": "string" }, "description": "Category labels" },
                    "datasets": datasets_schema.clone(),
                    "title": { "type": "string", "description": "Chart title" }
                },
                "required": ["labels", "datasets"]
            }),
        ),
        ToolDefinition::function(
            "create_line_chart",
            "Create a line chart for trends over an ordered axis and save it as an HTML artifact.",
            json!({
                "type": "object",
                "properties": {
                    "labels": { "type": "array", "items": { "type": "string" }, "description": "X axis labels" },
                    "datasets": datasets_schema,
                    "title": { "type": "string", "description": "Chart title" }
                },
                "required": ["labels", "datasets"]
            }),
        ),
        ToolDefinition::function(
            "create_pie_chart",
            "Create a pie chart for parts of a whole and save it as an HTML artifact.",
            json!({
                "type": "object",
                "properties": {
                    "labels": { "type": "array", "items": { "type": "string" }, "description": "Slice labels" },
                    "data": { "type": "array", "items": { "type": "number" }, "description": "Slice values" },
                    "title": { "type": "string", "description": "Chart title" },
                    "background_colors": {
                        "type": "string",
                        "description": "Optional JSON array of colors, e.g. [\"#FF6384\", \"#36A2EB\"]"
                    }
                },
                "required": ["labels", "data"]
            }),
        ),
        ToolDefinition::function(
            "create_time_series_chart",
            "Create a time series chart with a time x axis and save it as an HTML artifact.",
            json!({
                "type": "object",
                "properties": {
                    "data_json": {
                        "type": "string",
                        "description": "JSON array of points: [{\"x\": \"2024-01-01T12:00:00\", \"y\": 100}, ...]"
                    },
                    "label": { "type": "string", "description": "Dataset label. Default: Data" },
                    "title": { "type": "string", "description": "Chart title" }
                },
                "required": ["data_json"]
            }),
        ),
    ]
}

pub(super) fn is_visualization_tool(name: &str) -> bool {
    matches!(
        name,
        "create_bar_chart" | "create_line_chart" | "create_pie_chart" | "create_time_series_chart"
    )
}

#[derive(Debug, Deserialize)]
struct SeriesArgs {
    labels: Vec<String>,
    datasets: Vec<Value>,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct PieArgs {
    labels: Vec<String>,
    data: Vec<f64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    background_colors: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesArgs {
    data_json: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    title: String,
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Error: Invalid arguments: {}", e))
}

/// Colors from a JSON array string; anything else means the default palette.
fn parse_colors(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(colors) if !colors.is_empty() => Some(colors),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Ignoring invalid background_colors ({}); using defaults", e);
            None
        }
    }
}

fn build_config(tool_name: &str, args: Value) -> Result<ChartConfig, String> {
    match tool_name {
        "create_bar_chart" => {
            let a: SeriesArgs = parse(args)?;
            Ok(bar_chart(a.labels, a.datasets, &a.title))
        }
        "create_line_chart" => {
            let a: SeriesArgs = parse(args)?;
            Ok(line_chart(a.labels, a.datasets, &a.title))
        }
        "create_pie_chart" => {
            let a: PieArgs = parse(args)?;
            let colors = parse_colors(a.background_colors.as_deref());
            Ok(pie_chart(a.labels, a.data, &a.title, colors))
        }
        "create_time_series_chart" => {
            let a: TimeSeriesArgs = parse(args)?;
            let points = match serde_json::from_str::<Value>(&a.data_json) {
                Ok(Value::Array(points)) => points,
                _ => return Err(TIME_SERIES_FORMAT_ERROR.to_string()),
            };
            let label = a.label.filter(|l| !l.trim().is_empty());
            Ok(time_series_chart(points, label.as_deref().unwrap_or("Data"), &a.title))
        }
        other => Err(format!("Unknown visualization tool: {}", other)),
    }
}

pub(super) async fn execute(tool_name: &str, args: Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    let config = match build_config(tool_name, args) {
        Ok(c) => c,
        Err(msg) => return ToolResult::error(tool_name, msg),
    };
    let opts = &ctx.services.chart_options;
    let url = match chart_url(&config, opts) {
        Ok(u) => u,
        Err(e) => return ToolResult::error(tool_name, format!("Error creating chart: {}", e)),
    };

    let title = config.title();
    let filename = chart_artifact_name(title);
    let html = chart_html(&url, title, opts.width, opts.height);
    match ctx.save_artifact(&filename, Artifact::html(&html)).await {
        Ok(version) => ToolResult::ok(
            tool_name,
            format!(
                "Chart created and saved as artifact '{}' (version {}). Chart URL: {}",
                filename, version, url
            ),
        ),
        Err(e) => {
            tracing::warn!("Failed to save chart artifact {}: {}", filename, e);
            ToolResult::ok(
                tool_name,
                format!("Chart created at {}, but failed to save as artifact: {}", url, e),
            )
        }
    }
}
