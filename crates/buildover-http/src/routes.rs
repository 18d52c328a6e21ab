//! Control route handlers under `/buildover`.
//!
//! Errors are returned as `{"error": "..."}` with a 404 or 500 status.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use buildover_core::git::{GitBranch, GitDiff};
use buildover_core::{MergeResult, MergeStrategy, Session, SessionId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

const DEFAULT_DESCRIPTION: &str = "New session";

/// Error body for every control route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn internal(err: impl std::fmt::Display) -> ApiError {
    log::error!("Control request failed: {}", err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    #[serde(default)]
    pub should_merge: bool,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndSessionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeResult>,
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub branch: Option<String>,
}

/// Parse an optional JSON body. A bare POST gets the defaults, whatever its
/// content type.
fn json_or_default<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}")))
}

/// Handler for GET /buildover/widget.js
pub async fn widget(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read(&state.config.widget_path).await {
        Ok(script) => ([(header::CONTENT_TYPE, "application/javascript")], script).into_response(),
        Err(e) => {
            log::warn!(
                "Failed to serve widget from {}: {}",
                state.config.widget_path.display(),
                e
            );
            (StatusCode::NOT_FOUND, "Widget not found").into_response()
        }
    }
}

/// Handler for POST /buildover/session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Session> {
    let request: CreateSessionRequest = json_or_default(&body)?;
    let description = request
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let session = state.sessions.create(&description).await.map_err(internal)?;
    Ok(Json(session))
}

/// Handler for GET /buildover/session/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Session> {
    state
        .sessions
        .get(&SessionId(id))
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))
}

/// Handler for GET /buildover/sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<Session>> {
    Json(state.sessions.list())
}

/// Handler for POST /buildover/session/{id}/end
///
/// Stops the session's live agent before touching its branch. Unknown ids
/// are a no-op: an agent bound to an unstored id keeps running.
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<EndSessionResponse> {
    let request: EndSessionRequest = json_or_default(&body)?;
    let id = SessionId(id);
    if state.sessions.get(&id).is_none() {
        log::debug!("End requested for unknown session {}", id);
        return Ok(Json(EndSessionResponse {
            success: true,
            merge: None,
        }));
    }

    state.agents.remove(id.as_str());

    let merge = state
        .sessions
        .end(&id, request.should_merge, request.strategy)
        .await
        .map_err(internal)?;

    Ok(Json(EndSessionResponse {
        success: true,
        merge,
    }))
}

/// Handler for GET /buildover/diff?branch=
pub async fn diff(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<GitDiff> {
    let diff = state
        .git()
        .get_diff(query.branch.as_deref())
        .await
        .map_err(internal)?;
    Ok(Json(diff))
}

/// Handler for GET /buildover/branches
pub async fn branches(State(state): State<Arc<AppState>>) -> ApiResult<Vec<GitBranch>> {
    let branches = state.git().list_branches().await.map_err(internal)?;
    Ok(Json(branches))
}

// ============================================================================
// TESTS
// ============================================================================
