use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use historian_agent::llm::LlmClient;
use historian_agent::{AgentConfig, Services, SessionStore};
use historian_artifact::{Artifact, ArtifactScope, InMemoryArtifactStore};
use historian_data::{HistorianRepository, KnowledgeBase, QueryResult, SqlGenerator, TextCompletion};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

struct EmptyHistorian;

#[async_trait]
impl HistorianRepository for EmptyHistorian {
    async fn execute_query(
        &self,
        _sql: &str,
        _params: &[Value],
    ) -> historian_data::Result<QueryResult> {
        Ok(QueryResult::default())
    }

    async fn ping(&self) -> historian_data::Result<()> {
        Ok(())
    }
}

struct NoCompletion;

#[async_trait]
impl TextCompletion for NoCompletion {
    async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
        anyhow::bail!("not used in these tests")
    }
}

struct TestApp {
    router: Router,
    runner: Arc<Runner>,
    artifacts: Arc<InMemoryArtifactStore>,
}

fn test_app(llm_base: &str) -> TestApp {
    let generator = SqlGenerator::new(Arc::new(NoCompletion), Arc::new(KnowledgeBase::historian()));
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let services = Services::new(Arc::new(EmptyHistorian), Arc::new(generator), artifacts.clone());
    let config = AgentConfig {
        api_base: llm_base.to_string(),
        api_key: "sk-test".into(),
        stream: false,
        ..AgentConfig::default()
    };
    let client = Arc::new(LlmClient::new(llm_base, "sk-test").unwrap());
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
    let runner = Arc::new(Runner::new(config, client, Arc::new(services), "historian", sessions));
    let state = AppState {
        runner: runner.clone(),
        user_id: "demo_user".into(),
    };
    TestApp {
        router: router(state, artifacts.clone()),
        runner,
        artifacts,
    }
}

async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn sse_events(resp: Response) -> Vec<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

fn agent_request(body: Value) -> Request<Body> {
    Request::post("/api/agent")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app("http://127.0.0.1:9");
    let resp = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"status": "ok", "app": "historian"}));
}

#[tokio::test]
async fn test_conversations_for_unknown_and_known_sessions() {
    let app = test_app("http://127.0.0.1:9");
    let resp = app
        .router
        .clone()
        .oneshot(
            Request::get("/api/sessions/nope/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    {
        let session = app.runner.session("demo_user", "s1");
        let mut session = session.lock().await;
        session.tracker().start_new_conversation("flow on LOOP_2 today?");
    }
    let resp = app
        .router
        .oneshot(
            Request::get("/api/sessions/s1/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["question"], "flow on LOOP_2 today?");
    assert_eq!(body["current_conversation_id"], conversations[0]["id"]);
}

#[tokio::test]
async fn test_artifact_routes_are_nested_under_api() {
    let app = test_app("http://127.0.0.1:9");
    let scope = ArtifactScope::new("historian", "demo_user", "s1");
    app.artifacts
        .save(&scope, "report_flow.md", Artifact::markdown("# Flow"))
        .await
        .unwrap();
    let resp = app
        .router
        .oneshot(
            Request::get("/api/artifacts/historian/demo_user/s1/report_flow.md")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"# Flow");
}

#[tokio::test]
async fn test_agent_run_streams_ag_ui_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello from the historian."}}]
        })))
        .mount(&server)
        .await;
    let app = test_app(&server.uri());

    let resp = app
        .router
        .clone()
        .oneshot(agent_request(json!({
            "threadId": "thread_123",
            "runId": "run_456",
            "state": {"plant": "dairy"},
            "messages": [{"id": "msg_1", "role": "user", "content": "Hello, how can you help me?"}],
            "tools": [],
            "context": [],
            "forwardedProps": {}
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let events = sse_events(resp).await;
    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "STATE_SNAPSHOT",
            "RUN_FINISHED"
        ]
    );
    assert_eq!(events[0]["threadId"], "thread_123");
    assert_eq!(events[2]["delta"], "Hello from the historian.");
    assert_eq!(events[4]["snapshot"]["plant"], "dairy");
    assert_eq!(events[5]["runId"], "run_456");

    let session = app.runner.session("demo_user", "thread_123");
    assert_eq!(session.lock().await.history.len(), 2);
    assert_eq!(
        app.runner.sessions().list_sessions("historian", "demo_user"),
        vec!["thread_123"]
    );
}

#[tokio::test]
async fn test_agent_run_without_user_message_is_a_run_error() {
    let app = test_app("http://127.0.0.1:9");
    let resp = app
        .router
        .oneshot(agent_request(json!({
            "threadId": "t1",
            "messages": [{"role": "assistant", "content": "hi"}]
        })))
        .await
        .unwrap();
    let events = sse_events(resp).await;
    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["RUN_STARTED", "RUN_ERROR"]);
    assert_eq!(events[1]["message"], "Request contains no user message");
}

#[tokio::test]
async fn test_agent_run_llm_failure_is_a_run_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;
    let app = test_app(&server.uri());

    let resp = app
        .router
        .oneshot(agent_request(json!({
            "threadId": "t2",
            "messages": [{"role": "user", "content": "flow today?"}]
        })))
        .await
        .unwrap();
    let events = sse_events(resp).await;
    assert_eq!(events.first().unwrap()["type"], "RUN_STARTED");
    assert_eq!(events.last().unwrap()["type"], "RUN_ERROR");
    assert!(events.iter().all(|e| e["type"] != "RUN_FINISHED"));
}

#[tokio::test]
async fn test_agent_run_with_escaping_thread_id_is_a_run_error() {
    let app = test_app("http://127.0.0.1:9");
    for thread_id in ["../x", "/tmp/elsewhere", "user"] {
        let resp = app
            .router
            .clone()
            .oneshot(agent_request(json!({
                "threadId": thread_id,
                "messages": [{"role": "user", "content": "save a chart"}]
            })))
            .await
            .unwrap();
        let events = sse_events(resp).await;
        let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["RUN_STARTED", "RUN_ERROR"], "{thread_id}");
        assert!(events[1]["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid artifact scope"));
    }
    assert!(app.runner.sessions().list_sessions("historian", "demo_user").is_empty());
}

