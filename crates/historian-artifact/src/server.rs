//! HTTP routes over an [`ArtifactStore`].
//!
//! - `GET /artifacts/:app/:user/:session` → JSON list of filenames
//! - `GET /artifacts/:app/:user/:session/:filename[?version=N]` → raw content
//!
//! Nest under `/api` (or anywhere) from the binary.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::{ArtifactError, ArtifactScope, ArtifactStore};

pub type SharedStore = Arc<dyn ArtifactStore>;

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<u32>,
}

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/artifacts/:app/:user/:session", get(list_artifacts))
        .route("/artifacts/:app/:user/:session/:filename", get(get_artifact))
        .with_state(store)
}

fn error_response(err: ArtifactError) -> Response {
    let status = match err {
        ArtifactError::InvalidFilename(_) | ArtifactError::InvalidScope(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!("artifact request failed: {}", err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn list_artifacts(
    State(store): State<SharedStore>,
    Path((app, user, session)): Path<(String, String, String)>,
) -> Response {
    let scope = ArtifactScope::new(&app, &user, &session);
    match store.list_keys(&scope).await {
        Ok(keys) => Json(json!({ "artifacts": keys })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_artifact(
    State(store): State<SharedStore>,
    Path((app, user, session, filename)): Path<(String, String, String, String)>,
    Query(q): Query<VersionQuery>,
) -> Response {
    let scope = ArtifactScope::new(&app, &user, &session);
    match store.load(&scope, &filename, q.version).await {
        Ok(Some(artifact)) => (
            [(header::CONTENT_TYPE, artifact.mime_type)],
            artifact.data,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Artifact '{}' not found", filename) })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
