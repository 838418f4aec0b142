//! Fakes shared by the unit tests of this crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use historian_artifact::{ArtifactScope, InMemoryArtifactStore};
use historian_data::{
    DataError, HistorianRepository, KnowledgeBase, QueryResult, Row, SqlGenerator, TextCompletion,
};
use serde_json::{json, Value};

use crate::tools::Services;

/// Replays canned replies in order.
pub struct ScriptedModel {
    replies: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl TextCompletion for ScriptedModel {
    async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
    }
}

/// Returns a fixed result (or a database error) and records every call.
pub struct FixedHistorian {
    result: Option<QueryResult>,
    pub calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FixedHistorian {
    pub fn rows(result: QueryResult) -> Arc<Self> {
        Arc::new(Self {
            result: Some(result),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HistorianRepository for FixedHistorian {
    async fn execute_query(&self, sql: &str, params: &[Value]) -> historian_data::Result<QueryResult> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.result.clone().ok_or_else(|| DataError::Database {
            message: "Database query failed: relation \"nope\" does not exist".into(),
            details: json!({ "query": sql }),
        })
    }

    async fn ping(&self) -> historian_data::Result<()> {
        Ok(())
    }
}

pub fn loop_rows() -> QueryResult {
    let rows: Vec<Row> = [
        json!({"startdatetime": "2025-01-01T08:00:00", "tagname": "Cluster1.LOOP_2_SP", "value": 50}),
        json!({"startdatetime": "2025-01-01T08:00:00", "tagname": "Cluster1.LOOP_2_PV", "value": 48}),
        json!({"startdatetime": "2025-01-01T09:00:00", "tagname": "Cluster1.LOOP_2_SP", "value": 50}),
        json!({"startdatetime": "2025-01-01T09:00:00", "tagname": "Cluster1.LOOP_2_PV", "value": 51}),
    ]
    .into_iter()
    .map(|v| match v {
        Value::Object(m) => m,
        _ => unreachable!(),
    })
    .collect();
    QueryResult::from_rows(rows, 4.5)
}

pub struct Fixture {
    pub services: Services,
    pub historian: Arc<FixedHistorian>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub scope: ArtifactScope,
}

pub fn fixture(model: Arc<ScriptedModel>, historian: Arc<FixedHistorian>) -> Fixture {
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let generator = Arc::new(SqlGenerator::new(model, Arc::new(KnowledgeBase::historian())));
    Fixture {
        services: Services::new(historian.clone(), generator, artifacts.clone()),
        historian,
        artifacts,
        scope: ArtifactScope::new("historian", "demo_user", "s1"),
    }
}
