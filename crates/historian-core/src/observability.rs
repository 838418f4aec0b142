//! Observability: tracing init and the JSONL audit log.
//!
//! Uses config::ObservabilityConfig for HISTORIAN_QUIET, LOG_LEVEL, LOG_JSON, AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Tracing initialization mode.
#[derive(Clone, Copy, Debug)]
pub enum TracingMode {
    /// Use HISTORIAN_LOG_LEVEL / HISTORIAN_QUIET as configured.
    Default,
    /// Interactive chat: agent-internal warnings would interleave with the
    /// streamed answer, so only errors from the agent crate are shown.
    Chat,
}

/// Initialize tracing. Call once at process startup; later calls are no-ops.
pub fn init_tracing(mode: TracingMode) {
    let cfg = ObservabilityConfig::from_env();
    let mut level = if cfg.quiet {
        "historian=warn".to_string()
    } else {
        cfg.log_level.clone()
    };
    if matches!(mode, TracingMode::Chat) {
        level = format!("{},historian_agent=error", level);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = ObservabilityConfig::from_env().audit_log.clone()?;
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let mut guard = AUDIT_PATH.lock().ok()?;
    *guard = Some(path.clone());
    Some(path)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Audit: a tool finished (success or failure).
pub fn audit_tool_invoked(session_id: &str, tool: &str, success: bool, duration_ms: u64) {
    if let Some(path) = audit_path() {
        append_jsonl(
            &path,
            &json!({
                "ts": now_ts(),
                "event": "tool_invoked",
                "session_id": session_id,
                "tool": tool,
                "success": success,
                "duration_ms": duration_ms,
            }),
        );
    }
}

/// Audit: SQL reached the historian database.
pub fn audit_sql_executed(conversation_id: &str, sql: &str, row_count: usize, execution_time_ms: f64) {
    tracing::debug!(conversation_id, row_count, execution_time_ms, "SQL executed");
    if let Some(path) = audit_path() {
        append_jsonl(
            &path,
            &json!({
                "ts": now_ts(),
                "event": "sql_executed",
                "conversation_id": conversation_id,
                "sql": sql,
                "row_count": row_count,
                "execution_time_ms": execution_time_ms,
            }),
        );
    }
}

/// Audit: an artifact version was written.
pub fn audit_artifact_saved(path: &str, version: u32, mime_type: &str) {
    if let Some(audit) = audit_path() {
        append_jsonl(
            &audit,
            &json!({
                "ts": now_ts(),
                "event": "artifact_saved",
                "path": path,
                "version": version,
                "mime_type": mime_type,
            }),
        );
    }
}
