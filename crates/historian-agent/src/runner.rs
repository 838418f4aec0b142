//! Runner: binds sessions, tools and the agent loop for one app.

use std::sync::Arc;

use anyhow::Result;

use crate::agent_loop::run_agent_loop;
use crate::llm::LlmClient;
use crate::session::{SessionKey, SessionStore, SharedSession};
use crate::tools::{Services, ToolContext, ToolRegistry};
use crate::types::{AgentConfig, AgentResult, EventSink};

pub struct Runner {
    config: AgentConfig,
    client: Arc<LlmClient>,
    registry: ToolRegistry,
    services: Arc<Services>,
    sessions: Arc<SessionStore>,
    app_name: String,
}

impl Runner {
    pub fn new(
        config: AgentConfig,
        client: Arc<LlmClient>,
        services: Arc<Services>,
        app_name: &str,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            client,
            registry: ToolRegistry::new(),
            services,
            sessions,
            app_name: app_name.to_string(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn session_key(&self, user_id: &str, session_id: &str) -> SessionKey {
        SessionKey::new(&self.app_name, user_id, session_id)
    }

    pub fn session(&self, user_id: &str, session_id: &str) -> SharedSession {
        self.sessions.get_or_create(&self.session_key(user_id, session_id))
    }

    /// Run one user message in a session.
    ///
    /// Ids that cannot address an artifact namespace are rejected before a
    /// session is created for them. The session lock is held for the whole turn. History and the active
    /// agent are updated only when the turn succeeds; tracker state keeps
    /// whatever the tools recorded either way.
    pub async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        event_sink: &mut dyn EventSink,
    ) -> Result<AgentResult> {
        self.session_key(user_id, session_id).scope().validate()?;
        let session = self.session(user_id, session_id);
        let mut session = session.lock().await;
        let scope = session.key.scope();
        let history = session.history.clone();
        let start_agent = session.active_agent.clone();

        tracing::info!(
            session = session_id,
            user = user_id,
            agent = %start_agent,
            "Running agent turn"
        );
        let result = {
            let mut ctx = ToolContext::new(&self.services, &scope, &mut session.state);
            run_agent_loop(
                &self.config,
                &self.client,
                &self.registry,
                &start_agent,
                history,
                message,
                &mut ctx,
                event_sink,
            )
            .await?
        };

        session.history = result.messages.clone();
        session.active_agent = result.agent.clone();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::agents::{REPORTING_AGENT, ROOT_AGENT};
    use crate::test_support::{fixture, loop_rows, FixedHistorian, ScriptedModel};
    use crate::types::SilentEventSink;

    #[tokio::test]
    async fn test_run_persists_history_and_active_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "transfer_to_agent", "arguments": "{\"agent_name\":\"reporting_agent\"}"}
                    }]
                }}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Which data should the report cover?"}}]
            })))
            .mount(&server)
            .await;

        let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
        let config = AgentConfig {
            api_base: server.uri(),
            stream: false,
            ..AgentConfig::default()
        };
        let client = Arc::new(LlmClient::new(&server.uri(), "sk-test").unwrap());
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let runner = Runner::new(config, client, Arc::new(fx.services), "historian", sessions);

        let result = runner
            .run("demo_user", "s1", "I need a report", &mut SilentEventSink)
            .await
            .unwrap();
        assert_eq!(result.agent, REPORTING_AGENT);
        {
            let session = runner.session("demo_user", "s1");
            let session = session.lock().await;
            assert_eq!(session.active_agent, REPORTING_AGENT);
            assert_eq!(session.history.len(), 4);
        }

        // Second turn starts where the first ended and sees the history.
        let result = runner
            .run("demo_user", "s1", "the last query", &mut SilentEventSink)
            .await
            .unwrap();
        assert_eq!(result.agent, REPORTING_AGENT);
        assert_eq!(result.messages.len(), 6);

        let other = runner.session("demo_user", "s2");
        assert_eq!(other.lock().await.active_agent, ROOT_AGENT);
        assert_eq!(runner.sessions().list_sessions("historian", "demo_user"), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_run_rejects_session_ids_outside_the_artifact_namespace() {
        let fx = fixture(ScriptedModel::new(&[]), FixedHistorian::rows(loop_rows()));
        let client = Arc::new(LlmClient::new("http://127.0.0.1:9", "sk-test").unwrap());
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let runner = Runner::new(AgentConfig::default(), client, Arc::new(fx.services), "historian", sessions);

        for session_id in ["../../tmp", "/var/tmp", "user", ""] {
            let err = runner
                .run("demo_user", session_id, "hello", &mut SilentEventSink)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Invalid artifact scope"), "{session_id}: {err}");
        }
        assert!(runner.sessions().list_sessions("historian", "demo_user").is_empty());
    }
}
