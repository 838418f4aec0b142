//! Text-to-SQL and plot spec generation over a [`TextCompletion`] model.
//!
//! The SQL prompt carries the table DDL, documentation and the most similar
//! question/SQL pairs. When the caller allows the model to see data, it may
//! answer with an intermediate query (marked `intermediate_sql`) that is run
//! read-only and fed back before the final query is requested.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::chart::{infer_column_kind, PlotSpec};
use crate::error::{DataError, Result};
use crate::historian::{HistorianRepository, QueryResult};
use crate::knowledge::KnowledgeBase;
use crate::sql::{extract_sql, validate_read_only, SqlGuardError};

/// Single-shot chat completion used for generation.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

const INTERMEDIATE_MARKER: &str = "intermediate_sql";
const INTERMEDIATE_PREVIEW_ROWS: usize = 50;
const PLOT_SAMPLE_ROWS: usize = 5;

pub struct SqlGenerator {
    llm: Arc<dyn TextCompletion>,
    knowledge: Arc<KnowledgeBase>,
    examples_per_prompt: usize,
    historian: Option<Arc<dyn HistorianRepository>>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn TextCompletion>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            llm,
            knowledge,
            examples_per_prompt: 5,
            historian: None,
        }
    }

    #[must_use]
    pub fn with_examples_per_prompt(mut self, k: usize) -> Self {
        self.examples_per_prompt = k;
        self
    }

    /// Database used for intermediate queries when data access is allowed.
    #[must_use]
    pub fn with_historian(mut self, historian: Arc<dyn HistorianRepository>) -> Self {
        self.historian = Some(historian);
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    async fn ask(&self, system: &str, user: &str) -> Result<String> {
        self.llm
            .complete(system, user)
            .await
            .map_err(|e| DataError::Llm(e.to_string()))
    }

    fn sql_system_prompt(&self, question: &str, allow_llm_to_see_data: bool) -> String {
        let kb = &self.knowledge;
        let mut p = String::from(
            "You are a PostgreSQL expert. Generate a SQL query that answers the question. \
             Base your response only on the context below and follow the response guidelines.\n",
        );

        p.push_str("\n===Tables\n");
        for ddl in &kb.ddl {
            p.push_str(ddl);
            p.push_str("\n\n");
        }

        if !kb.documentation.is_empty() {
            p.push_str("===Additional Context\n");
            for doc in &kb.documentation {
                p.push_str(doc);
                p.push_str("\n\n");
            }
        }

        p.push_str("===Response Guidelines\n");
        p.push_str("1. If the context is sufficient, reply with one valid SQL query in a ```sql block and no explanation.\n");
        if allow_llm_to_see_data {
            p.push_str(&format!(
                "2. If you need to know specific values in a column (for example exact tag names), reply with an intermediate query that lists the distinct values. Start it with the comment -- {}\n",
                INTERMEDIATE_MARKER
            ));
        } else {
            p.push_str("2. You cannot run queries to inspect data; use ILIKE patterns when exact values are unknown.\n");
        }
        p.push_str("3. If the context is insufficient, explain why the query cannot be generated.\n");
        p.push_str("4. Use the most relevant table(s).\n");
        p.push_str("5. The query must be read-only (SELECT or WITH), PostgreSQL-compliant and free of syntax errors.\n");
        p.push_str("6. Quote column names with double quotes.\n");

        let examples = kb.similar_examples(question, self.examples_per_prompt);
        if !examples.is_empty() {
            p.push_str("\n===Question-SQL Pairs\n");
            for ex in examples {
                p.push_str(&format!("Question: {}\nSQL: {}\n\n", ex.question, ex.sql));
            }
        }
        p
    }

    /// Generate a read-only SQL query for `question`.
    pub async fn generate_sql(&self, question: &str, allow_llm_to_see_data: bool) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DataError::validation("Question cannot be empty"));
        }

        let system = self.sql_system_prompt(question, allow_llm_to_see_data);
        let mut reply = self.ask(&system, question).await?;

        if allow_llm_to_see_data && reply.contains(INTERMEDIATE_MARKER) {
            if let Some(ref historian) = self.historian {
                let intermediate = validate_read_only(&extract_sql(&reply))?;
                tracing::info!("Running intermediate SQL: {}", intermediate);
                let result = historian.execute_query(&intermediate, &[]).await?;
                let followup = format!(
                    "{}\n\n===Intermediate Query Results\nQuery:\n{}\n\nResults:\n{}\n\nNow write the final query. Do not return another intermediate query.",
                    system,
                    intermediate,
                    result.preview(INTERMEDIATE_PREVIEW_ROWS)
                );
                reply = self.ask(&followup, question).await?;
            } else {
                tracing::warn!("Model asked for an intermediate query but no database is attached");
            }
        }

        let candidate = extract_sql(&reply);
        match validate_read_only(&candidate) {
            Ok(sql) => Ok(sql),
            Err(SqlGuardError::NotReadOnly(_)) if !reply.contains("```") => Err(DataError::Generation(
                format!("Could not generate SQL: {}", reply.trim()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Ask for a [`PlotSpec`] describing how to chart `result`.
    pub async fn generate_plot_spec(&self, question: &str, sql: &str, result: &QueryResult) -> Result<PlotSpec> {
        if question.trim().is_empty() {
            return Err(DataError::validation("Question cannot be empty"));
        }
        if sql.trim().is_empty() {
            return Err(DataError::validation("SQL query cannot be empty"));
        }
        if result.is_empty() {
            return Err(DataError::validation("Query returned no rows to plot"));
        }

        let system = "You design charts for query results. Reply with a single JSON object and nothing else:\n\
            {\"chart_type\": \"bar\" | \"line\" | \"pie\" | \"scatter\" | \"time_series\", \
            \"x\": <column>, \"y\": [<column>, ...], \"series\": <column or null>, \"title\": <short title>}\n\
            Rules: use time_series when x is a timestamp; use series to split one y column by a category \
            column (for example tagname); pie takes exactly one y column and no series; \
            only use columns that exist in the result.";

        let columns: Vec<String> = result
            .columns
            .iter()
            .map(|c| {
                let kind = serde_json::to_value(infer_column_kind(&result.rows, c))
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                format!("- {} ({})", c, kind)
            })
            .collect();
        let sample: Vec<Value> = result
            .rows
            .iter()
            .take(PLOT_SAMPLE_ROWS)
            .map(|r| Value::Object(r.clone()))
            .collect();
        let user = format!(
            "Question: {}\n\nSQL:\n{}\n\nResult has {} rows with columns:\n{}\n\nSample rows:\n{}",
            question.trim(),
            sql.trim(),
            result.row_count,
            columns.join("\n"),
            serde_json::to_string_pretty(&sample).unwrap_or_default()
        );

        let reply = self.ask(system, &user).await?;
        let spec = PlotSpec::from_json(extract_json(&reply))?;
        spec.validate(&result.columns)?;
        Ok(spec)
    }

    /// Plain-language explanation of a query.
    pub async fn explain_sql(&self, sql: &str) -> Result<String> {
        if sql.trim().is_empty() {
            return Err(DataError::validation("SQL query cannot be empty"));
        }
        self.ask(
            "You are a helpful assistant that will explain a SQL query",
            &format!("Explain this SQL query: {}", sql.trim()),
        )
        .await
    }
}

/// JSON object inside a reply: a ```json block, else the outermost braces.
fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if s < e => &trimmed[s..=e],
        _ => trimmed,
    }
}
