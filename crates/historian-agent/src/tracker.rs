//! Conversation tracker: the four-step workflow of one data question.
//!
//! Every `generate_sql_query` call opens a conversation (8-char id) and makes it
//! current. The following tools record their output into the current
//! conversation's steps:
//!
//! 1. `1_sql_generated`: generated SQL
//! 2. `2_sql_executed`: rows, columns, timing
//! 3. `3_plot_code_generated`: plot spec
//! 4. `4_figure_created`: saved chart artifact
//!
//! State lives in the session state map under [`STATE_KEY`] so it travels with
//! state snapshots. Updates aimed at a missing conversation are logged and
//! dropped; they never fail the calling tool.

use std::collections::BTreeMap;

use chrono::Utc;
use historian_data::Row;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STATE_KEY: &str = "historian_conversations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlGenerated {
    pub sql: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlExecuted {
    pub sql: String,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub execution_time_ms: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotCodeGenerated {
    pub plot_code: String,
    pub question: String,
    pub sql: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureCreated {
    pub filename: String,
    pub version: u32,
    pub timestamp: String,
    pub sql_used: String,
    pub chart_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Steps {
    #[serde(rename = "1_sql_generated", default)]
    pub sql_generated: Option<SqlGenerated>,
    #[serde(rename = "2_sql_executed", default)]
    pub sql_executed: Option<SqlExecuted>,
    #[serde(rename = "3_plot_code_generated", default)]
    pub plot_code_generated: Option<PlotCodeGenerated>,
    #[serde(rename = "4_figure_created", default)]
    pub figure_created: Option<FigureCreated>,
}

/// Payload for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepUpdate {
    SqlGenerated(SqlGenerated),
    SqlExecuted(SqlExecuted),
    PlotCodeGenerated(PlotCodeGenerated),
    FigureCreated(FigureCreated),
}

impl StepUpdate {
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::SqlGenerated(_) => "1_sql_generated",
            Self::SqlExecuted(_) => "2_sql_executed",
            Self::PlotCodeGenerated(_) => "3_plot_code_generated",
            Self::FigureCreated(_) => "4_figure_created",
        }
    }

    fn apply(self, steps: &mut Steps) {
        match self {
            Self::SqlGenerated(d) => steps.sql_generated = Some(d),
            Self::SqlExecuted(d) => steps.sql_executed = Some(d),
            Self::PlotCodeGenerated(d) => steps.plot_code_generated = Some(d),
            Self::FigureCreated(d) => steps.figure_created = Some(d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub question: String,
    pub timestamp: String,
    pub artifact: Option<String>,
    pub steps: Steps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerState {
    pub conversations: BTreeMap<String, Conversation>,
    pub current_id: Option<String>,
}

/// UTC ISO-8601 timestamp without offset, as stored in step payloads.
pub fn utc_timestamp() -> String {
    Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// View over a session state map.
pub struct ConversationTracker<'a> {
    state: &'a mut Map<String, Value>,
}

impl<'a> ConversationTracker<'a> {
    pub fn new(state: &'a mut Map<String, Value>) -> Self {
        Self { state }
    }

    fn load(&self) -> Option<TrackerState> {
        let raw = self.state.get(STATE_KEY)?;
        match serde_json::from_value(raw.clone()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Ignoring malformed {} state: {}", STATE_KEY, e);
                None
            }
        }
    }

    fn store(&mut self, tracker: &TrackerState) {
        match serde_json::to_value(tracker) {
            Ok(v) => {
                self.state.insert(STATE_KEY.to_string(), v);
            }
            Err(e) => tracing::warn!("Failed to store {} state: {}", STATE_KEY, e),
        }
    }

    /// Create empty tracker state if absent.
    pub fn initialize(&mut self) {
        if self.load().is_none() {
            self.store(&TrackerState::default());
        }
    }

    /// Open a new conversation for `question` and make it current.
    pub fn start_new_conversation(&mut self, question: &str) -> String {
        let mut tracker = self.load().unwrap_or_default();
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        tracker.conversations.insert(
            id.clone(),
            Conversation {
                id: id.clone(),
                question: question.to_string(),
                timestamp: utc_timestamp(),
                artifact: None,
                steps: Steps::default(),
            },
        );
        tracker.current_id = Some(id.clone());
        self.store(&tracker);
        tracing::debug!(conversation = %id, "started conversation");
        id
    }

    pub fn get_current_conversation(&self) -> Option<Conversation> {
        let mut tracker = self.load()?;
        let id = tracker.current_id.clone()?;
        tracker.conversations.remove(&id)
    }

    pub fn get_conversation_by_id(&self, id: &str) -> Option<Conversation> {
        self.load()?.conversations.remove(id)
    }

    /// Record a step on `conversation_id`, or on the current conversation.
    /// Returns false (with a warning) when there is nothing to update.
    pub fn update_step(&mut self, update: StepUpdate, conversation_id: Option<&str>) -> bool {
        let step = update.step_name();
        let Some(mut tracker) = self.load() else {
            tracing::warn!("No state found to update step '{}'", step);
            return false;
        };
        let target = match conversation_id {
            Some(id) => Some(id.to_string()),
            None => tracker.current_id.clone(),
        };
        let Some(conversation) = target.and_then(|id| tracker.conversations.get_mut(&id)) else {
            tracing::warn!("No conversation found to update step '{}'", step);
            return false;
        };
        update.apply(&mut conversation.steps);
        tracing::debug!(conversation = %conversation.id, step, "updated step");
        self.store(&tracker);
        true
    }

    /// Set the artifact filename of a conversation.
    pub fn set_artifact(&mut self, conversation_id: &str, filename: &str) -> bool {
        let Some(mut tracker) = self.load() else {
            return false;
        };
        let Some(conversation) = tracker.conversations.get_mut(conversation_id) else {
            return false;
        };
        conversation.artifact = Some(filename.to_string());
        self.store(&tracker);
        true
    }

    /// Every conversation of the session, keyed by id.
    pub fn get_all_conversations(&self) -> BTreeMap<String, Conversation> {
        self.load().map(|t| t.conversations).unwrap_or_default()
    }

    /// Conversations ordered by start time.
    pub fn conversations_by_time(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self.get_all_conversations().into_values().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        all
    }
}
