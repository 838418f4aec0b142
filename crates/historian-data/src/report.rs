//! Markdown report assembly and lightweight result analysis.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DataError, Result};
use crate::historian::Row;

const SAMPLE_ROWS: usize = 10;
const ANALYZED_NUMERIC_COLUMNS: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    pub title: String,
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub sql_results: Option<Vec<Row>>,
    #[serde(default)]
    pub sql_row_count: Option<usize>,
    #[serde(default)]
    pub chart_url: Option<String>,
    #[serde(default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub chart_title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub insights: Option<Vec<String>>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
    #[serde(default)]
    pub execution_time_ms: Option<f64>,
}

impl ReportRequest {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DataError::validation("Title cannot be empty"));
        }
        if self.execution_time_ms.is_some_and(|t| t < 0.0) {
            return Err(DataError::validation("execution_time_ms must be >= 0"));
        }
        Ok(())
    }

    /// Description shown under the chart, present whenever a chart URL is set.
    pub fn chart_description(&self) -> Option<String> {
        self.chart_url.as_ref()?;
        Some(format!(
            "Visual representation showing {}",
            self.chart_type.as_deref().filter(|t| !t.is_empty()).unwrap_or("chart")
        ))
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}

/// Every word starts upper-case, the rest lower-case (`time_series` → `Time_Series`).
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn table_cell(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.replace('|', "\\|").replace('\n', " "),
        Some(other) => other.to_string(),
    }
}

/// Render the report. Sections without data are omitted.
pub fn generate_markdown(req: &ReportRequest, generated_at: NaiveDateTime) -> String {
    let mut md: Vec<String> = Vec::new();

    md.push(format!("# {}", req.title.trim()));
    md.push(format!("*Generated on: {}*", generated_at.format("%Y-%m-%d %H:%M:%S")));
    md.push(String::new());

    if let Some(summary) = non_empty(&req.summary) {
        md.push("## Executive Summary".to_string());
        md.push(summary.to_string());
        md.push(String::new());
    }

    if let (Some(sql), Some(results)) = (non_empty(&req.sql_query), req.sql_results.as_ref()) {
        let row_count = req.sql_row_count.filter(|n| *n > 0).unwrap_or(results.len());

        md.push("## Data Query".to_string());
        md.push("### SQL Query Executed".to_string());
        md.push("```sql".to_string());
        md.push(sql.to_string());
        md.push("```".to_string());
        md.push(String::new());

        md.push("### Query Results Summary".to_string());
        md.push(format!("- **Rows Retrieved:** {}", row_count));
        if let Some(t) = req.execution_time_ms.filter(|t| *t != 0.0) {
            md.push(format!("- **Execution Time:** {:.2} ms", t));
        }
        md.push(String::new());

        if let Some(first) = results.first() {
            md.push("### Sample Data".to_string());
            let headers: Vec<&String> = first.keys().collect();
            md.push(format!(
                "| {} |",
                headers.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(" | ")
            ));
            md.push(format!("| {} |", vec!["---"; headers.len()].join(" | ")));
            for row in results.iter().take(SAMPLE_ROWS) {
                let cells: Vec<String> = headers.iter().map(|h| table_cell(row.get(*h))).collect();
                md.push(format!("| {} |", cells.join(" | ")));
            }
            if results.len() > SAMPLE_ROWS {
                md.push(format!("*Showing first {} of {} rows*", SAMPLE_ROWS, row_count));
            }
            md.push(String::new());
        }
    }

    if let Some(url) = non_empty(&req.chart_url) {
        md.push("## Data Visualization".to_string());
        if let Some(chart_title) = non_empty(&req.chart_title) {
            md.push(format!("### {}", chart_title));
        }
        md.push(format!("![Chart]({})", url));
        md.push(format!(" Chart URL: {}", url));
        md.push(String::new());

        if let Some(description) = req.chart_description() {
            let chart_type = non_empty(&req.chart_type).map_or_else(|| "Unknown".to_string(), title_case);
            md.push(format!("**Chart Type:** {}", chart_type));
            md.push(format!("**Description:** {}", description));
            md.push(String::new());
        }
    }

    for (heading, items) in [
        ("## Key Insights", &req.insights),
        ("## Recommendations", &req.recommendations),
    ] {
        if let Some(items) = items.as_ref().filter(|v| !v.is_empty()) {
            md.push(heading.to_string());
            for (i, item) in items.iter().enumerate() {
                md.push(format!("{}. {}", i + 1, item));
            }
            md.push(String::new());
        }
    }

    md.push("---".to_string());
    md.push("*This report was generated automatically using AI-powered analysis.*".to_string());
    md.join("\n")
}

/// Validate and render with the local time as the generation timestamp.
pub fn generate_report(req: &ReportRequest) -> Result<String> {
    req.validate()?;
    Ok(generate_markdown(req, chrono::Local::now().naive_local()))
}

// ─── Analysis ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub insights: Vec<String>,
    pub summary: String,
    pub numeric_columns: Vec<String>,
    pub row_count: usize,
}

/// Column values as `(number, display)` when every row has the column and
/// all non-null values are numbers or booleans. Booleans count as 0 and 1.
fn numeric_values(rows: &[Row], column: &str) -> Option<Vec<(f64, String)>> {
    let mut values = Vec::new();
    for row in rows {
        match row.get(column)? {
            Value::Null => {}
            Value::Number(n) => values.push((n.as_f64().unwrap_or_default(), n.to_string())),
            Value::Bool(b) => values.push((f64::from(u8::from(*b)), b.to_string())),
            _ => return None,
        }
    }
    (!values.is_empty()).then_some(values)
}

/// Record/column counts, numeric columns, and stats for up to three of them.
pub fn analyze_results(rows: &[Row], context: &str) -> Analysis {
    let Some(first) = rows.first() else {
        return Analysis {
            insights: vec!["No data available for analysis".to_string()],
            summary: "No results returned from query".to_string(),
            numeric_columns: Vec::new(),
            row_count: 0,
        };
    };

    let row_count = rows.len();
    let columns: Vec<&String> = first.keys().collect();
    let numeric: Vec<(&String, Vec<(f64, String)>)> = columns
        .iter()
        .filter_map(|c| numeric_values(rows, c).map(|v| (*c, v)))
        .collect();
    let numeric_columns: Vec<String> = numeric.iter().map(|(c, _)| (*c).clone()).collect();

    let mut insights = vec![
        format!(
            "Dataset contains {} records across {} columns",
            row_count,
            columns.len()
        ),
        format!(
            "Numeric columns available for analysis: {}",
            if numeric_columns.is_empty() {
                "None".to_string()
            } else {
                numeric_columns.join(", ")
            }
        ),
    ];

    for (col, pairs) in numeric.iter().take(ANALYZED_NUMERIC_COLUMNS) {
        let avg = pairs.iter().map(|(f, _)| f).sum::<f64>() / pairs.len() as f64;
        let min = pairs
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, shown)| shown.as_str())
            .unwrap_or_default();
        let max = pairs
            .iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, shown)| shown.as_str())
            .unwrap_or_default();
        insights.push(format!("{}: Average {:.2}, Range {} to {}", col, avg, min, max));
    }

    let summary = if context.trim().is_empty() {
        format!("Analysis of {} records", row_count)
    } else {
        format!("Analysis of {} records with focus on {}", row_count, context)
    };

    Analysis {
        insights,
        summary,
        numeric_columns,
        row_count,
    }
}

/// Tool-level analysis: results must be non-empty.
pub fn analyze_sql_results(rows: &[Row], context: &str) -> Result<Analysis> {
    if rows.is_empty() {
        return Err(DataError::validation("SQL results cannot be empty"));
    }
    Ok(analyze_results(rows, context))
}

/// Default recommendations when the caller supplies none.
pub fn default_recommendations() -> Vec<String> {
    [
        "Review data quality and completeness",
        "Consider automated monitoring for key metrics",
        "Schedule regular report updates",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
