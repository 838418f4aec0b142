//! Chart.js configs rendered by the QuickChart service.
//!
//! Charts are never drawn locally: a config is serialized into a QuickChart URL
//! and embedded in a small HTML page that is stored as an artifact.
//!
//! [`PlotSpec`] is the declarative chart description produced for a query
//! result; [`render_plot`] turns it plus the rows into a [`ChartConfig`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::{DataError, Result};
use crate::historian::{QueryResult, Row};

pub const QUICKCHART_BASE_URL: &str = "https://quickchart.io/chart";

/// Default slice colours (Chart.js sample palette).
pub const DEFAULT_COLORS: [&str; 8] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40", "#FF6384", "#C9CBCF",
];

const TIME_SERIES_COLOR: &str = "#36A2EB";

// ─── Chart.js config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl ChartConfig {
    /// Title text from `options.title.text`, or "".
    pub fn title(&self) -> &str {
        self.options
            .as_ref()
            .and_then(|o| o.pointer("/title/text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

fn title_value(title: &str) -> Value {
    json!({ "display": true, "text": title })
}

fn with_title(mut config: ChartConfig, title: &str) -> ChartConfig {
    if title.is_empty() {
        return config;
    }
    match config.options {
        Some(Value::Object(ref mut opts)) => {
            opts.insert("title".to_string(), title_value(title));
        }
        _ => config.options = Some(json!({ "title": title_value(title) })),
    }
    config
}

fn labelled(kind: &str, labels: Vec<String>, datasets: Vec<Value>, title: &str) -> ChartConfig {
    with_title(
        ChartConfig {
            chart_type: kind.to_string(),
            data: json!({ "labels": labels, "datasets": datasets }),
            options: None,
        },
        title,
    )
}

pub fn bar_chart(labels: Vec<String>, datasets: Vec<Value>, title: &str) -> ChartConfig {
    labelled("bar", labels, datasets, title)
}

pub fn line_chart(labels: Vec<String>, datasets: Vec<Value>, title: &str) -> ChartConfig {
    labelled("line", labels, datasets, title)
}

/// Pie chart; `colors` falls back to [`DEFAULT_COLORS`].
pub fn pie_chart(labels: Vec<String>, data: Vec<f64>, title: &str, colors: Option<Vec<String>>) -> ChartConfig {
    let colors =
        colors.unwrap_or_else(|| DEFAULT_COLORS.iter().map(|c| c.to_string()).collect());
    labelled(
        "pie",
        labels,
        vec![json!({ "data": data, "backgroundColor": colors })],
        title,
    )
}

/// Line chart over a time x axis. `points` are `{"x": timestamp, "y": value}`.
pub fn time_series_chart(points: Vec<Value>, label: &str, title: &str) -> ChartConfig {
    time_series_config(
        vec![json!({
            "label": label,
            "data": points,
            "borderColor": TIME_SERIES_COLOR,
            "fill": false,
        })],
        title,
    )
}

fn time_series_config(datasets: Vec<Value>, title: &str) -> ChartConfig {
    with_title(
        ChartConfig {
            chart_type: "line".to_string(),
            data: json!({ "datasets": datasets }),
            options: Some(json!({
                "scales": {
                    "x": {
                        "type": "time",
                        "time": { "displayFormats": { "hour": "MMM DD HH:mm" } }
                    }
                }
            })),
        },
        title,
    )
}

pub fn scatter_chart(datasets: Vec<Value>, title: &str) -> ChartConfig {
    with_title(
        ChartConfig {
            chart_type: "scatter".to_string(),
            data: json!({ "datasets": datasets }),
            options: None,
        },
        title,
    )
}

// ─── QuickChart URL and HTML ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    pub background_color: String,
    pub format: String,
    pub device_pixel_ratio: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 500,
            height: 300,
            background_color: "white".to_string(),
            format: "png".to_string(),
            device_pixel_ratio: 1,
        }
    }
}

/// Percent-encode, keeping `/` literal.
fn quote(s: &str) -> String {
    urlencoding::encode(s).replace("%2F", "/")
}

pub fn chart_url(config: &ChartConfig, opts: &ChartOptions) -> Result<String> {
    let compact = serde_json::to_string(config).map_err(|e| DataError::Chart(e.to_string()))?;
    Ok(format!(
        "{}?c={}&width={}&height={}&backgroundColor={}&format={}&devicePixelRatio={}",
        QUICKCHART_BASE_URL,
        quote(&compact),
        opts.width,
        opts.height,
        quote(&opts.background_color),
        quote(&opts.format),
        opts.device_pixel_ratio
    ))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Standalone HTML page embedding the chart image.
pub fn chart_html(url: &str, title: &str, width: u32, height: u32) -> String {
    let page_title = if title.is_empty() { "Chart" } else { title };
    let title_div = if title.is_empty() {
        String::new()
    } else {
        format!(r#"<div class="chart-title">{}</div>"#, escape_html(title))
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{page_title}</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            margin: 0;
            padding: 20px;
            background-color: #f8f9fa;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
        }}
        .chart-container {{
            background: white;
            border-radius: 12px;
            padding: 24px;
            box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1);
            max-width: 100%;
            text-align: center;
        }}
        .chart-title {{
            font-size: 20px;
            font-weight: 600;
            margin-bottom: 20px;
            color: #2c3e50;
        }}
        .chart-image {{
            max-width: 100%;
            height: auto;
            border-radius: 8px;
        }}
        .chart-info {{
            margin-top: 15px;
            font-size: 12px;
            color: #7f8c8d;
        }}
    </style>
</head>
<body>
    <div class="chart-container">
        {title_div}
        <img src="{src}" alt="{alt}" class="chart-image" width="{width}" height="{height}">
        <div class="chart-info">Generated with QuickChart API</div>
    </div>
</body>
</html>
"#,
        page_title = escape_html(page_title),
        title_div = title_div,
        src = escape_html(url),
        alt = escape_html(page_title),
        width = width,
        height = height,
    )
}

/// `chart_<title_lowercased_with_underscores>.html`, or `chart_visualization.html`.
pub fn chart_artifact_name(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return "chart_visualization.html".to_string();
    }
    let base: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("chart_{}.html", base.replace("..", "_"))
}

// ─── Column kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Temporal,
    Text,
}

fn looks_temporal(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Kind of `column` judged from its non-null values.
pub fn infer_column_kind(rows: &[Row], column: &str) -> ColumnKind {
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| !v.is_null())
        .collect();
    if values.is_empty() {
        return ColumnKind::Text;
    }
    if values.iter().all(|v| v.is_number()) {
        ColumnKind::Numeric
    } else if values.iter().all(|v| v.as_str().is_some_and(looks_temporal)) {
        ColumnKind::Temporal
    } else {
        ColumnKind::Text
    }
}

// ─── PlotSpec ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
    #[serde(alias = "timeseries", alias = "time-series")]
    TimeSeries,
}

impl ChartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
            Self::TimeSeries => "time_series",
        }
    }
}

/// Declarative chart description for a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    #[serde(alias = "type")]
    pub chart_type: ChartKind,
    pub x: String,
    #[serde(deserialize_with = "one_or_many")]
    pub y: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn one_or_many<'de, D>(d: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl PlotSpec {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| DataError::Generation(format!("Invalid plot spec: {}", e)))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Check referenced columns exist in the result.
    pub fn validate(&self, columns: &[String]) -> Result<()> {
        if self.y.is_empty() {
            return Err(DataError::validation("Plot spec must name at least one y column"));
        }
        if self.chart_type == ChartKind::Pie && (self.y.len() != 1 || self.series.is_some()) {
            return Err(DataError::validation(
                "A pie chart takes exactly one y column and no series",
            ));
        }
        let referenced = std::iter::once(&self.x)
            .chain(self.y.iter())
            .chain(self.series.iter());
        for col in referenced {
            if !columns.iter().any(|c| c == col) {
                return Err(DataError::validation(format!(
                    "Column '{}' is not in the query result (columns: {})",
                    col,
                    columns.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn cell_label(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn cell_number(v: Option<&Value>) -> Value {
    match v {
        Some(Value::Number(n)) => Value::Number(n.clone()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number),
        Some(Value::Bool(b)) => json!(u8::from(*b)),
        _ => Value::Null,
    }
}

/// Distinct values of `column` in first-seen order.
fn distinct_labels(rows: &[Row], column: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for row in rows {
        let label = cell_label(row.get(column));
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    seen
}

fn dataset_color(i: usize) -> &'static str {
    DEFAULT_COLORS[(i + 1) % DEFAULT_COLORS.len()]
}

/// (series label, rows) groups; one group per y column when no series is set.
fn grouped_points(spec: &PlotSpec, rows: &[Row]) -> Vec<(String, Vec<Value>)> {
    let point = |row: &Row, y: &str| -> Value {
        let x = match row.get(&spec.x) {
            Some(Value::Number(n)) if spec.chart_type == ChartKind::Scatter => Value::Number(n.clone()),
            other => Value::String(cell_label(other)),
        };
        json!({ "x": x, "y": cell_number(row.get(y)) })
    };
    match spec.series {
        Some(ref series) => {
            let y = &spec.y[0];
            distinct_labels(rows, series)
                .into_iter()
                .map(|s| {
                    let pts = rows
                        .iter()
                        .filter(|r| cell_label(r.get(series)) == s)
                        .map(|r| point(r, y.as_str()))
                        .collect();
                    (s, pts)
                })
                .collect()
        }
        None => spec
            .y
            .iter()
            .map(|y| (y.clone(), rows.iter().map(|r| point(r, y.as_str())).collect()))
            .collect(),
    }
}

/// Build a Chart.js config from a spec and the rows it describes.
pub fn render_plot(spec: &PlotSpec, result: &QueryResult) -> Result<ChartConfig> {
    spec.validate(&result.columns)?;
    let rows = &result.rows;
    let title = spec.title.as_deref().unwrap_or_default();

    let config = match spec.chart_type {
        ChartKind::Bar | ChartKind::Line => {
            let labels = distinct_labels(rows, &spec.x);
            let datasets: Vec<Value> = match spec.series {
                Some(ref series) => distinct_labels(rows, series)
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let data: Vec<Value> = labels
                            .iter()
                            .map(|x| {
                                rows.iter()
                                    .find(|r| {
                                        cell_label(r.get(series)) == s && cell_label(r.get(&spec.x)) == *x
                                    })
                                    .map_or(Value::Null, |r| cell_number(r.get(&spec.y[0])))
                            })
                            .collect();
                        json!({ "label": s, "data": data, "backgroundColor": dataset_color(i) })
                    })
                    .collect(),
                None => spec
                    .y
                    .iter()
                    .enumerate()
                    .map(|(i, y)| {
                        let data: Vec<Value> = rows.iter().map(|r| cell_number(r.get(y))).collect();
                        json!({ "label": y, "data": data, "backgroundColor": dataset_color(i) })
                    })
                    .collect(),
            };
            // Without a series every row is its own label.
            let labels = if spec.series.is_some() {
                labels
            } else {
                rows.iter().map(|r| cell_label(r.get(&spec.x))).collect()
            };
            if spec.chart_type == ChartKind::Bar {
                bar_chart(labels, datasets, title)
            } else {
                line_chart(labels, datasets, title)
            }
        }
        ChartKind::Pie => {
            let labels = rows.iter().map(|r| cell_label(r.get(&spec.x))).collect();
            let data = rows
                .iter()
                .map(|r| cell_number(r.get(&spec.y[0])).as_f64().unwrap_or(0.0))
                .collect();
            pie_chart(labels, data, title, None)
        }
        ChartKind::Scatter => {
            let datasets = grouped_points(spec, rows)
                .into_iter()
                .enumerate()
                .map(|(i, (label, pts))| {
                    json!({ "label": label, "data": pts, "backgroundColor": dataset_color(i) })
                })
                .collect();
            scatter_chart(datasets, title)
        }
        ChartKind::TimeSeries => {
            let datasets = grouped_points(spec, rows)
                .into_iter()
                .enumerate()
                .map(|(i, (label, pts))| {
                    json!({ "label": label, "data": pts, "borderColor": dataset_color(i), "fill": false })
                })
                .collect();
            time_series_config(datasets, title)
        }
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(raw: &[&str]) -> QueryResult {
        let rows = raw.iter().map(|r| serde_json::from_str(r).unwrap()).collect();
        QueryResult::from_rows(rows, 2.0)
    }

    fn loop_rows() -> QueryResult {
        result(&[
            r#"{"startdatetime":"2025-01-01T08:00:00","tagname":"LOOP_2_SP","value":50}"#,
            r#"{"startdatetime":"2025-01-01T08:00:00","tagname":"LOOP_2_PV","value":48.5}"#,
            r#"{"startdatetime":"2025-01-01T08:01:00","tagname":"LOOP_2_SP","value":50}"#,
            r#"{"startdatetime":"2025-01-01T08:01:00","tagname":"LOOP_2_PV","value":49.1}"#,
        ])
    }

    #[test]
    fn test_bar_chart_title_goes_to_options() {
        let cfg = bar_chart(vec!["a".into()], vec![json!({"label": "kWh", "data": [1]})], "Energy");
        assert_eq!(cfg.chart_type, "bar");
        assert_eq!(cfg.options.as_ref().unwrap()["title"], json!({"display": true, "text": "Energy"}));
        assert_eq!(cfg.title(), "Energy");
        let untitled = line_chart(vec![], vec![], "");
        assert!(untitled.options.is_none());
    }

    #[test]
    fn test_pie_chart_default_palette() {
        let cfg = pie_chart(vec!["Mixer".into(), "Pump".into()], vec![10.0, 5.0], "", None);
        assert_eq!(cfg.data["datasets"][0]["backgroundColor"][0], "#FF6384");
        assert_eq!(cfg.data["datasets"][0]["backgroundColor"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_time_series_chart_axis_and_title() {
        let cfg = time_series_chart(vec![json!({"x": "2025-01-01T08:00:00", "y": 1})], "kWh", "Usage");
        let opts = cfg.options.unwrap();
        assert_eq!(opts["scales"]["x"]["type"], "time");
        assert_eq!(opts["scales"]["x"]["time"]["displayFormats"]["hour"], "MMM DD HH:mm");
        assert_eq!(opts["title"]["text"], "Usage");
        assert_eq!(cfg.data["datasets"][0]["borderColor"], "#36A2EB");
        assert_eq!(cfg.data["datasets"][0]["fill"], false);
    }

    #[test]
    fn test_chart_url_shape() {
        let cfg = bar_chart(vec!["a b".into()], vec![], "");
        let url = chart_url(&cfg, &ChartOptions::default()).unwrap();
        assert!(url.starts_with("https://quickchart.io/chart?c=%7B%22type%22%3A%22bar%22"));
        assert!(url.ends_with("&width=500&height=300&backgroundColor=white&format=png&devicePixelRatio=1"));
        assert!(url.contains("a%20b"));
    }

    #[test]
    fn test_chart_html_embeds_image() {
        let html = chart_html("https://quickchart.io/chart?c=x&width=500", "Line <1>", 500, 300);
        assert!(html.contains(r#"<img src="https://quickchart.io/chart?c=x&amp;width=500""#));
        assert!(html.contains(r#"<div class="chart-title">Line &lt;1&gt;</div>"#));
        assert!(html.contains("Generated with QuickChart API"));
        assert!(chart_html("u", "", 1, 1).contains("<title>Chart</title>"));
    }

    #[test]
    fn test_chart_artifact_name() {
        assert_eq!(chart_artifact_name("Energy By Line"), "chart_energy_by_line.html");
        assert_eq!(chart_artifact_name(""), "chart_visualization.html");
        assert_eq!(chart_artifact_name("kWh/day"), "chart_kwh_day.html");
    }

    #[test]
    fn test_infer_column_kind() {
        let r = loop_rows();
        assert_eq!(infer_column_kind(&r.rows, "value"), ColumnKind::Numeric);
        assert_eq!(infer_column_kind(&r.rows, "startdatetime"), ColumnKind::Temporal);
        assert_eq!(infer_column_kind(&r.rows, "tagname"), ColumnKind::Text);
    }

    #[test]
    fn test_plot_spec_parse_and_validate() {
        let spec = PlotSpec::from_json(
            r#"{"type": "time_series", "x": "startdatetime", "y": "value", "series": "tagname"}"#,
        )
        .unwrap();
        assert_eq!(spec.chart_type, ChartKind::TimeSeries);
        assert_eq!(spec.y, vec!["value"]);
        assert!(spec.validate(&loop_rows().columns).is_ok());

        let bad = PlotSpec { x: "nope".into(), ..spec.clone() };
        let err = bad.validate(&loop_rows().columns).unwrap_err();
        assert!(err.to_string().contains("Column 'nope'"));

        let pie = PlotSpec { chart_type: ChartKind::Pie, ..spec };
        assert!(pie.validate(&loop_rows().columns).is_err());
        assert!(PlotSpec::from_json("plot it nicely").is_err());
    }

    #[test]
    fn test_render_time_series_groups_by_series() {
        let spec = PlotSpec {
            chart_type: ChartKind::TimeSeries,
            x: "startdatetime".into(),
            y: vec!["value".into()],
            series: Some("tagname".into()),
            title: Some("Loop 2".into()),
        };
        let cfg = render_plot(&spec, &loop_rows()).unwrap();
        let datasets = cfg.data["datasets"].as_array().unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0]["label"], "LOOP_2_SP");
        assert_eq!(datasets[0]["borderColor"], "#36A2EB");
        assert_eq!(datasets[1]["data"][1], json!({"x": "2025-01-01T08:01:00", "y": 49.1}));
        assert_eq!(cfg.title(), "Loop 2");
    }

    #[test]
    fn test_render_bar_with_series_pivots_rows() {
        let spec = PlotSpec {
            chart_type: ChartKind::Bar,
            x: "startdatetime".into(),
            y: vec!["value".into()],
            series: Some("tagname".into()),
            title: None,
        };
        let cfg = render_plot(&spec, &loop_rows()).unwrap();
        assert_eq!(cfg.data["labels"], json!(["2025-01-01T08:00:00", "2025-01-01T08:01:00"]));
        assert_eq!(cfg.data["datasets"][1]["data"], json!([48.5, 49.1]));
        assert!(cfg.options.is_none());
    }

    #[test]
    fn test_render_pie() {
        let r = result(&[
            r#"{"equipment_type":"Mixer","total_kwh":"120.5"}"#,
            r#"{"equipment_type":"Pump","total_kwh":80}"#,
        ]);
        let spec = PlotSpec {
            chart_type: ChartKind::Pie,
            x: "equipment_type".into(),
            y: vec!["total_kwh".into()],
            series: None,
            title: None,
        };
        let cfg = render_plot(&spec, &r).unwrap();
        assert_eq!(cfg.chart_type, "pie");
        assert_eq!(cfg.data["labels"], json!(["Mixer", "Pump"]));
        assert_eq!(cfg.data["datasets"][0]["data"], json!([120.5, 80.0]));
    }
}
