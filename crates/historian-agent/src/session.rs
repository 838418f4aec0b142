//! In-memory sessions keyed by (app, user, session).
//!
//! Each session sits behind its own async mutex: a run holds the lock for the
//! whole turn, so concurrent requests for one session serialise while other
//! sessions proceed. Sessions idle longer than the timeout are purged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use historian_artifact::ArtifactScope;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;

use crate::agents::ROOT_AGENT;
use crate::tracker::ConversationTracker;
use crate::types::ChatMessage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    pub fn scope(&self) -> ArtifactScope {
        ArtifactScope::new(&self.app_name, &self.user_id, &self.session_id)
    }
}

/// Per-session conversation state.
#[derive(Debug)]
pub struct SessionState {
    pub key: SessionKey,
    /// Chat history without system prompts.
    pub history: Vec<ChatMessage>,
    /// Agent that answers the next message.
    pub active_agent: String,
    /// Free-form state; the conversation tracker lives here.
    pub state: Map<String, Value>,
}

impl SessionState {
    pub fn new(key: SessionKey) -> Self {
        let mut state = Map::new();
        ConversationTracker::new(&mut state).initialize();
        Self {
            key,
            history: Vec::new(),
            active_agent: ROOT_AGENT.to_string(),
            state,
        }
    }

    pub fn tracker(&mut self) -> ConversationTracker<'_> {
        ConversationTracker::new(&mut self.state)
    }

    /// Merge client-supplied state without touching tracker state.
    pub fn merge_state(&mut self, incoming: Map<String, Value>) {
        for (k, v) in incoming {
            if k != crate::tracker::STATE_KEY {
                self.state.insert(k, v);
            }
        }
    }

    /// Forget history and conversations; keep the key.
    pub fn reset(&mut self) {
        *self = Self::new(self.key.clone());
    }
}

pub type SharedSession = Arc<AsyncMutex<SessionState>>;

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<SessionKey, Entry>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, Entry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Existing session, or a fresh one. Touches the idle clock.
    pub fn get_or_create(&self, key: &SessionKey) -> SharedSession {
        let mut sessions = self.lock();
        let entry = sessions.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(session = %key.session_id, user = %key.user_id, "new session");
            Entry {
                session: Arc::new(AsyncMutex::new(SessionState::new(key.clone()))),
                last_used: Instant::now(),
            }
        });
        entry.last_used = Instant::now();
        Arc::clone(&entry.session)
    }

    pub fn get(&self, key: &SessionKey) -> Option<SharedSession> {
        self.lock().get(key).map(|e| Arc::clone(&e.session))
    }

    pub fn remove(&self, key: &SessionKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Session ids of one user, sorted.
    pub fn list_sessions(&self, app_name: &str, user_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .map(|k| k.session_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle past the timeout that no run currently holds.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, e| {
            now.duration_since(e.last_used) < self.timeout || Arc::strong_count(&e.session) > 1
        });
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::info!("Purged {} idle session(s)", purged);
        }
        purged
    }

    /// Purge every `interval` until the store is dropped.
    pub fn spawn_purge_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.purge_expired();
                    }
                    None => break,
                }
            }
        })
    }
}
