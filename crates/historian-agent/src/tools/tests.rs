use serde_json::{json, Map, Value};

use super::*;
use crate::test_support::{fixture, loop_rows, FixedHistorian, ScriptedModel};

const SQL_REPLY: &str = "```sql\nSELECT \"startdatetime\", \"tagname\", \"value\" FROM public.historian WHERE \"tagname\" ILIKE '%LOOP_2%'\n```";
const PLOT_REPLY: &str = r#"{"chart_type": "line", "x": "startdatetime", "y": ["value"], "series": "tagname", "title": "Loop 2 SP vs PV"}"#;
const GENERATED_SQL: &str =
    "SELECT \"startdatetime\", \"tagname\", \"value\" FROM public.historian WHERE \"tagname\" ILIKE '%LOOP_2%'";

fn new_state() -> Map<String, Value> {
    let mut state = Map::new();
    ConversationTracker::new(&mut state).initialize();
    state
}

#[test]
fn test_registry_lists_every_tool_once() {
    let registry = ToolRegistry::new();
    let names: Vec<&str> = registry.all_tool_definitions().iter().map(|d| d.name()).collect();
    assert_eq!(names.len(), 12);
    for name in [
        "generate_sql_query",
        "execute_sql_query",
        "generate_plot_code",
        "create_chart_figure",
        "explain_sql_query",
        "execute_query",
        "analyze_results",
        "generate_report",
        "create_bar_chart",
        "create_line_chart",
        "create_pie_chart",
        "create_time_series_chart",
    ] {
        assert!(registry.owns_tool(name), "missing {}", name);
    }
    let subset = registry.definitions_for(&["generate_report", "nope", "analyze_results"]);
    let subset: Vec<&str> = subset.iter().map(|d| d.name()).collect();
    assert_eq!(subset, vec!["generate_report", "analyze_results"]);
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry.execute("drop_everything", "{}", &mut ctx).await;
    assert!(r.is_error);
    assert_eq!(r.content, "Unknown tool: drop_everything");

    let r = registry.execute("execute_sql_query", "{not json", &mut ctx).await;
    assert!(r.is_error);
    assert!(r.content.starts_with("Invalid arguments JSON:"));
}

#[tokio::test]
async fn test_full_workflow_tracks_four_steps() {
    let fx = fixture(
        ScriptedModel::new(&[SQL_REPLY, PLOT_REPLY]),
        FixedHistorian::rows(loop_rows()),
    );
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry
        .execute(
            "generate_sql_query",
            r#"{"question": "Compare LOOP_2_SP vs LOOP_2_PV"}"#,
            &mut ctx,
        )
        .await;
    assert!(!r.is_error, "{}", r.content);
    let conv_id = ctx.tracker().get_current_conversation().unwrap().id;
    assert!(r.content.starts_with(&format!("[Conversation {}]", conv_id)));
    assert!(r.content.contains(GENERATED_SQL));

    let args = json!({ "sql": GENERATED_SQL }).to_string();
    let r = registry.execute("execute_sql_query", &args, &mut ctx).await;
    assert!(!r.is_error, "{}", r.content);
    assert!(r.content.contains("Query executed successfully!"));
    assert!(r.content.contains("Rows returned: 4"));
    assert!(r.content.contains("Columns: startdatetime, tagname, value"));

    let args = json!({ "question": "Compare LOOP_2_SP vs LOOP_2_PV", "sql": GENERATED_SQL }).to_string();
    let r = registry.execute("generate_plot_code", &args, &mut ctx).await;
    assert!(!r.is_error, "{}", r.content);
    assert!(r.content.contains("\"chart_type\": \"line\""));

    let args = json!({ "plot_code": "", "sql": GENERATED_SQL }).to_string();
    let r = registry.execute("create_chart_figure", &args, &mut ctx).await;
    assert!(!r.is_error, "{}", r.content);
    assert!(r
        .content
        .starts_with(&format!("✅ [Conversation {}] Chart created and saved as artifact 'chart_{}_", conv_id, conv_id)));
    assert!(r.content.contains("(version 0)"));
    assert!(r.content.contains("Chart URL: https://quickchart.io/chart?c="));

    let conversation = ctx.tracker().get_conversation_by_id(&conv_id).unwrap();
    let figure = conversation.steps.figure_created.unwrap();
    assert_eq!(conversation.artifact.as_deref(), Some(figure.filename.as_str()));
    assert_eq!(figure.sql_used, GENERATED_SQL);

    let saved = fx
        .artifacts
        .load(&fx.scope, &figure.filename, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.mime_type, "text/html");
    assert!(saved.text().contains("Loop 2 SP vs PV"));
}

#[tokio::test]
async fn test_step_preconditions() {
    let fx = fixture(ScriptedModel::new(&[SQL_REPLY]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry
        .execute("execute_sql_query", r#"{"sql": "SELECT 1"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert_eq!(
        r.content,
        "Error: No active conversation. Please generate SQL first using `generate_sql_query`."
    );

    registry
        .execute("generate_sql_query", r#"{"question": "loop 2"}"#, &mut ctx)
        .await;

    let r = registry
        .execute("generate_plot_code", r#"{"question": "loop 2", "sql": "SELECT 1"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert_eq!(
        r.content,
        "Error: SQL must be executed before generating plot code. Use `execute_sql_query` first."
    );

    let r = registry
        .execute("create_chart_figure", r#"{"plot_code": "{}", "sql": "SELECT 1"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert_eq!(
        r.content,
        "Error: SQL must be executed before creating figure. Use `execute_sql_query` first."
    );

    let args = json!({ "sql": GENERATED_SQL }).to_string();
    registry.execute("execute_sql_query", &args, &mut ctx).await;
    let r = registry
        .execute("create_chart_figure", r#"{"plot_code": "{}", "sql": "SELECT 1"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert_eq!(
        r.content,
        "Error: Plot code must be generated before creating figure. Use `generate_plot_code` first."
    );
}

#[tokio::test]
async fn test_execute_sql_query_rejects_writes_and_reports_db_errors() {
    let fx = fixture(ScriptedModel::new(&[SQL_REPLY]), FixedHistorian::failing());
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);
    registry
        .execute("generate_sql_query", r#"{"question": "loop 2"}"#, &mut ctx)
        .await;

    let r = registry
        .execute("execute_sql_query", r#"{"sql": "DELETE FROM public.historian"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert!(r.content.starts_with("Error executing SQL query: Only read-only queries"));
    assert!(r.content.ends_with("SQL Query:\nDELETE FROM public.historian"));
    assert!(fx.historian.calls.lock().unwrap().is_empty());

    let r = registry
        .execute("execute_sql_query", r#"{"sql": "SELECT * FROM nope"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert!(r.content.contains("relation \"nope\" does not exist"));
    assert!(ctx
        .tracker()
        .get_current_conversation()
        .unwrap()
        .steps
        .sql_executed
        .is_none());
}

#[tokio::test]
async fn test_generate_sql_failure_is_wrapped_in_envelope() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry
        .execute("generate_sql_query", r#"{"question": "loop 2"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    let envelope = r.content.strip_prefix("Error generating SQL: ").unwrap();
    let v: Value = serde_json::from_str(envelope).unwrap();
    assert_eq!(v["status"], "error");
    assert_eq!(v["error"]["code"], "LLM_RESPONSE_ERROR");
    // The conversation still exists, without a generated step.
    let conversation = ctx.tracker().get_current_conversation().unwrap();
    assert!(conversation.steps.sql_generated.is_none());
}

#[tokio::test]
async fn test_execute_query_envelope_and_parameters() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let args = json!({
        "query": "SELECT * FROM public.historian WHERE tagname = :tag AND value > :min",
        "parameters": { "tag": "Cluster1.LOOP_2_PV", "min": 40 }
    })
    .to_string();
    let r = registry.execute("execute_query", &args, &mut ctx).await;
    assert!(!r.is_error, "{}", r.content);
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["status"], "success");
    assert_eq!(v["data"]["row_count"], 4);
    assert_eq!(v["data"]["rows"].as_array().unwrap().len(), 4);
    {
        let calls = fx.historian.calls.lock().unwrap();
        assert_eq!(
            calls[0].0,
            "SELECT * FROM public.historian WHERE tagname = $1 AND value > $2"
        );
        assert_eq!(calls[0].1, vec![json!("Cluster1.LOOP_2_PV"), json!(40)]);
    }

    let r = registry
        .execute("execute_query", r#"{"query": "DROP TABLE public.historian"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["status"], "error");
    assert_eq!(v["error"]["code"], "VALIDATION_ERROR");

    let r = registry
        .execute("execute_query", r#"{"query": "SELECT 1", "parameters": 5}"#, &mut ctx)
        .await;
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["error"]["message"], "parameters must be an object or an array");
}

#[tokio::test]
async fn test_execute_query_database_error_has_details() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::failing());
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry
        .execute("execute_query", r#"{"query": "SELECT * FROM nope"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["error"]["code"], "DATABASE_ERROR");
    assert_eq!(v["error"]["details"]["query"], "SELECT * FROM nope");
}

#[tokio::test]
async fn test_analyze_results() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry
        .execute(
            "analyze_results",
            r#"{"sql_results": [{"value": 10}, {"value": 30}], "context": "flow"}"#,
            &mut ctx,
        )
        .await;
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["status"], "success");
    assert_eq!(v["data"]["summary"], "Analysis of 2 records with focus on flow");
    assert_eq!(v["data"]["numeric_columns"], json!(["value"]));

    let r = registry
        .execute("analyze_results", r#"{"sql_results": []}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(v["error"]["message"], "SQL results cannot be empty");
}

#[tokio::test]
async fn test_generate_report_uses_current_conversation_and_saves_artifact() {
    let fx = fixture(
        ScriptedModel::new(&[SQL_REPLY, PLOT_REPLY]),
        FixedHistorian::rows(loop_rows()),
    );
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    registry
        .execute("generate_sql_query", r#"{"question": "loop 2"}"#, &mut ctx)
        .await;
    let args = json!({ "sql": GENERATED_SQL }).to_string();
    registry.execute("execute_sql_query", &args, &mut ctx).await;
    registry
        .execute("generate_plot_code", r#"{"question": "loop 2"}"#, &mut ctx)
        .await;
    let r = registry
        .execute("create_chart_figure", r#"{"plot_code": ""}"#, &mut ctx)
        .await;
    assert!(!r.is_error, "{}", r.content);

    let r = registry
        .execute("generate_report", r#"{"title": "Loop 2 Report"}"#, &mut ctx)
        .await;
    assert!(!r.is_error, "{}", r.content);
    let v: Value = serde_json::from_str(&r.content).unwrap();
    let report = v["data"]["report"].as_str().unwrap();
    assert!(report.starts_with("# Loop 2 Report"));
    assert!(report.contains(GENERATED_SQL));
    assert!(report.contains("https://quickchart.io/chart?c="));
    assert!(report.contains("Dataset contains 4 records across 3 columns"));
    assert!(report.contains("Review data quality and completeness"));
    assert_eq!(v["metadata"]["artifact"], "report_loop_2_report.md");
    assert_eq!(v["metadata"]["version"], 0);

    let saved = fx
        .artifacts
        .load(&fx.scope, "report_loop_2_report.md", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.text(), report);
}

#[tokio::test]
async fn test_generate_report_requires_title() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let r = registry
        .execute("generate_report", r#"{"title": "  "}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["error"]["message"], "Title cannot be empty");

    let r = registry.execute("generate_report", "{}", &mut ctx).await;
    let v: Value = serde_json::from_str(&r.content).unwrap();
    assert_eq!(v["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_chart_tools_save_artifacts() {
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&fx.services, &fx.scope, &mut state);

    let args = json!({
        "labels": ["Line A", "Line B"],
        "datasets": [{ "label": "Units", "data": [120, 95] }],
        "title": "Units per Line"
    })
    .to_string();
    let r = registry.execute("create_bar_chart", &args, &mut ctx).await;
    assert!(!r.is_error, "{}", r.content);
    assert!(r
        .content
        .starts_with("Chart created and saved as artifact 'chart_units_per_line.html' (version 0). Chart URL: https://quickchart.io/chart?c="));

    let r = registry.execute("create_bar_chart", &args, &mut ctx).await;
    assert!(r.content.contains("(version 1)"));

    let args = json!({
        "labels": ["Running", "Idle"],
        "data": [75.0, 25.0],
        "background_colors": "not a list"
    })
    .to_string();
    let r = registry.execute("create_pie_chart", &args, &mut ctx).await;
    assert!(r.content.contains("'chart_visualization.html'"));

    let r = registry
        .execute("create_time_series_chart", r#"{"data_json": "oops"}"#, &mut ctx)
        .await;
    assert!(r.is_error);
    assert_eq!(
        r.content,
        r#"Error: Invalid JSON format for data_json. Expected format: [{"x": "timestamp", "y": value}, ...]"#
    );

    let keys = fx.artifacts.list_keys(&fx.scope).await.unwrap();
    assert_eq!(keys, vec!["chart_units_per_line.html", "chart_visualization.html"]);
}

#[test]
fn test_process_tool_result_content_keeps_head_and_tail() {
    let short = "abc";
    assert_eq!(process_tool_result_content(short, 10), "abc");

    let long = format!("{}{}", "h".repeat(100), "t".repeat(100));
    let out = process_tool_result_content(&long, 60);
    assert!(out.starts_with(&format!("{}\n", "h".repeat(40))));
    assert!(out.ends_with(&format!("\n{}", "t".repeat(20))));
    let marker = "\n\n[... 140 chars omitted ...]\n\n";
    assert!(out.contains(marker));
    assert_eq!(out.len() - marker.len(), 60);

    // Multi-byte text never exceeds the budget either.
    let wide = "é".repeat(100);
    let out = process_tool_result_content(&wide, 61);
    let kept = out.replace(|c: char| c != 'é', "");
    assert!(kept.len() <= 61, "kept {} bytes", kept.len());
}

#[tokio::test]
async fn test_reports_land_in_local_artifact_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(historian_artifact::LocalArtifactStore::new(dir.path()));
    let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
    let services = Services::new(fx.services.historian.clone(), fx.services.generator.clone(), store.clone());
    let registry = ToolRegistry::new();
    let mut state = new_state();
    let mut ctx = ToolContext::new(&services, &fx.scope, &mut state);

    let args = json!({
        "title": "Shift Summary",
        "sql_query": "SELECT 1",
        "sql_results": [{"units": 10}, {"units": 14}],
        "use_current_conversation": false
    })
    .to_string();
    let r = registry.execute("generate_report", &args, &mut ctx).await;
    assert!(!r.is_error, "{}", r.content);

    assert_eq!(store.list_versions(&fx.scope, "report_shift_summary.md").await.unwrap(), vec![0]);
    let saved = store
        .load(&fx.scope, "report_shift_summary.md", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.mime_type, "text/markdown");
    assert!(saved.text().contains("Analysis of 2 records with focus on Shift Summary"));
}
