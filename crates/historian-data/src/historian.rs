//! Historian database repository.
//!
//! Queries are wrapped as `SELECT row_to_json(q)::text FROM (<sql>\n) AS q` so every
//! Postgres type (numeric, timestamp, interval, ...) arrives as JSON, with column
//! order preserved by serde_json's `preserve_order` map.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use historian_core::config::DatabaseConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{DataError, Result};

pub type Row = Map<String, Value>;

/// Rows returned by one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: f64,
}

impl QueryResult {
    /// Build from rows; columns come from the first row.
    pub fn from_rows(rows: Vec<Row>, execution_time_ms: f64) -> Self {
        let columns = rows
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            columns,
            row_count: rows.len(),
            rows,
            execution_time_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fixed-width text table of the first `n` rows.
    pub fn preview(&self, n: usize) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_string();
        }
        let shown: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(n)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| preview_cell(row.get(c)))
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &shown {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let render = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", c, width = *w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut lines = Vec::with_capacity(shown.len() + 2);
        lines.push(render(&self.columns));
        lines.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("  "),
        );
        for row in &shown {
            lines.push(render(row));
        }
        if self.rows.len() > n {
            lines.push(format!("... ({} more rows)", self.rows.len() - n));
        }
        lines.join("\n")
    }
}

const PREVIEW_CELL_MAX: usize = 40;

fn preview_cell(v: Option<&Value>) -> String {
    let s = match v {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if s.chars().count() > PREVIEW_CELL_MAX {
        let cut: String = s.chars().take(PREVIEW_CELL_MAX - 3).collect();
        format!("{}...", cut)
    } else {
        s
    }
}

#[async_trait]
pub trait HistorianRepository: Send + Sync {
    /// Run one query with positional (`$1…`) parameters.
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Connectivity check.
    async fn ping(&self) -> Result<()>;
}

pub struct PgHistorian {
    pool: PgPool,
}

impl PgHistorian {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect eagerly; fails if the database is unreachable.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = pool_options(cfg)
            .connect(&cfg.connection_url())
            .await
            .map_err(|e| connection_error(cfg, &e))?;
        tracing::info!("Connected to historian database {}", cfg.redacted_url());
        Ok(Self::new(pool))
    }

    /// Build the pool without connecting; connections open on first query.
    pub fn connect_lazy(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = pool_options(cfg)
            .connect_lazy(&cfg.connection_url())
            .map_err(|e| connection_error(cfg, &e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn pool_options(cfg: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(10))
}

fn connection_error(cfg: &DatabaseConfig, e: &sqlx::Error) -> DataError {
    DataError::Database {
        message: format!("Database connection failed: {}", e),
        details: json!({ "url": cfg.redacted_url(), "error_type": sqlx_error_kind(e) }),
    }
}

fn sqlx_error_kind(e: &sqlx::Error) -> &'static str {
    match e {
        sqlx::Error::Database(_) => "DatabaseError",
        sqlx::Error::PoolTimedOut => "PoolTimedOut",
        sqlx::Error::PoolClosed => "PoolClosed",
        sqlx::Error::Io(_) => "IoError",
        sqlx::Error::Tls(_) => "TlsError",
        sqlx::Error::Protocol(_) => "ProtocolError",
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => "DecodeError",
        sqlx::Error::Configuration(_) => "ConfigurationError",
        _ => "SqlxError",
    }
}

/// Wrap a statement so each row comes back as one JSON text column.
fn wrap_as_json(sql: &str) -> String {
    let inner = crate::sql::trim_statement_end(sql.trim());
    // The newline ends any line comment the statement still carries.
    format!("SELECT row_to_json(q)::text FROM ({}\n) AS q", inner)
}

#[async_trait]
impl HistorianRepository for PgHistorian {
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(DataError::validation("Query cannot be empty"));
        }
        let wrapped = wrap_as_json(sql);
        let mut query = sqlx::query_scalar::<_, String>(&wrapped);
        for p in params {
            query = match p {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => query.bind(i),
                    None => query.bind(n.as_f64().unwrap_or_default()),
                },
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }

        let start = Instant::now();
        let raw = query.fetch_all(&self.pool).await.map_err(|e| {
            tracing::warn!("Historian query failed: {}", e);
            DataError::Database {
                message: format!("Database query failed: {}", e),
                details: json!({
                    "query": sql,
                    "parameters": params,
                    "error_type": sqlx_error_kind(&e),
                }),
            }
        })?;
        let execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let rows = raw
            .iter()
            .map(|text| serde_json::from_str::<Row>(text))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DataError::Database {
                message: format!("Failed to decode query row: {}", e),
                details: json!({ "query": sql }),
            })?;

        tracing::debug!(rows = rows.len(), execution_time_ms, "historian query done");
        Ok(QueryResult::from_rows(rows, execution_time_ms))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::Database {
                message: format!("Database connection check failed: {}", e),
                details: json!({ "error_type": sqlx_error_kind(&e) }),
            })?;
        Ok(())
    }
}

/// Startup connectivity test (`SELECT 1`).
pub async fn check_connection(repo: &dyn HistorianRepository) -> Result<()> {
    repo.ping().await
}
