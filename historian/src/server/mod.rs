//! HTTP server: the agent SSE endpoint, session inspection and artifacts.
//!
//! - `POST /api/agent` → AG-UI event stream for one run (see [`agui`])
//! - `GET /health`
//! - `GET /api/sessions` → session ids of the default user
//! - `GET /api/sessions/:session_id/conversations` → tracked conversations
//! - `/api/artifacts/...` → [`historian_artifact::server`]

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use historian_agent::{AgentEvent, ChannelEventSink, Runner};
use historian_artifact::ArtifactStore;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod agui;

#[cfg(test)]
mod tests;

use agui::{AgUiEncoder, RunAgentInput};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    /// Sessions created over HTTP belong to this user.
    pub user_id: String,
}

pub fn router(state: AppState, artifacts: Arc<dyn ArtifactStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agent", post(run_agent))
        .route("/api/sessions", get(list_sessions))
        .route(
            "/api/sessions/:session_id/conversations",
            get(list_conversations),
        )
        .with_state(state)
        .nest("/api", historian_artifact::server::router(artifacts))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C.
pub async fn serve(router: Router, host: &str, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    tracing::info!("Listening on http://{}:{}", host, port);
    eprintln!("🚀 Historian server on http://{}:{}  (POST /api/agent)", host, port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "app": state.runner.app_name() }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state
        .runner
        .sessions()
        .list_sessions(state.runner.app_name(), &state.user_id);
    Json(json!({ "sessions": sessions }))
}

async fn list_conversations(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let key = state.runner.session_key(&state.user_id, &session_id);
    let Some(session) = state.runner.sessions().get(&key) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Session '{}' not found", session_id) })),
        )
            .into_response();
    };
    let mut session = session.lock().await;
    let tracker = session.tracker();
    let current = tracker.get_current_conversation().map(|c| c.id);
    let conversations = tracker.conversations_by_time();
    Json(json!({
        "session_id": session_id,
        "current_conversation_id": current,
        "conversations": conversations,
    }))
    .into_response()
}

async fn run_agent(
    State(state): State<AppState>,
    Json(input): Json<RunAgentInput>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    tokio::spawn(drive_run(state, input, tx));

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let value = rx.recv().await?;
        Some((Ok(Event::default().data(value.to_string())), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run one agent turn and push its AG-UI events into `out`. Send errors mean
/// the client went away; the turn still runs to completion so the session
/// stays consistent.
async fn drive_run(state: AppState, input: RunAgentInput, out: mpsc::UnboundedSender<Value>) {
    let thread_id = input
        .thread_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let run_id = input
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut encoder = AgUiEncoder::new(&thread_id, &run_id);
    let emit = |events: Vec<Value>| {
        for e in events {
            let _ = out.send(e);
        }
    };

    emit(vec![encoder.run_started()]);
    if !input.tools.is_empty() || !input.context.is_empty() {
        tracing::debug!(
            tools = input.tools.len(),
            context = input.context.len(),
            forwarded_props = %input.forwarded_props,
            "Ignoring client-side tools and context"
        );
    }
    let Some(message) = input.last_user_message() else {
        emit(encoder.error("Request contains no user message"));
        return;
    };

    let runner = Arc::clone(&state.runner);
    if let Err(e) = runner.session_key(&state.user_id, &thread_id).scope().validate() {
        tracing::warn!(thread = %thread_id, "Rejected run: {}", e);
        emit(encoder.error(&e.to_string()));
        return;
    }
    let session = runner.session(&state.user_id, &thread_id);
    let incoming = input.state_map();
    if !incoming.is_empty() {
        session.lock().await.merge_state(incoming);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AgentEvent>();
    let user_id = state.user_id.clone();
    let session_id = thread_id.clone();
    let turn = tokio::spawn(async move {
        let mut sink = ChannelEventSink::new(event_tx);
        runner.run(&user_id, &session_id, &message, &mut sink).await
    });

    while let Some(agent_event) = event_rx.recv().await {
        emit(encoder.encode(agent_event));
    }

    match turn.await {
        Ok(Ok(result)) => {
            tracing::info!(
                thread = %thread_id,
                run = %run_id,
                agent = %result.agent,
                tool_calls = result.tool_calls_count,
                "Agent run finished"
            );
            let snapshot = Value::Object(session.lock().await.state.clone());
            emit(encoder.finish(snapshot));
        }
        Ok(Err(e)) => {
            tracing::error!(thread = %thread_id, "Agent run failed: {:#}", e);
            emit(encoder.error(&format!("{:#}", e)));
        }
        Err(e) => {
            tracing::error!(thread = %thread_id, "Agent task panicked: {}", e);
            emit(encoder.error("Agent run aborted"));
        }
    }
}
