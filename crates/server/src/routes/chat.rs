//! Streaming chat turns.

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use runtime::{Message, ModelError, collect_tools};
use serde::Deserialize;
use tracing::{info, instrument};

use super::required;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<Message>,
    session_id: Option<String>,
    #[serde(default)]
    connected_servers: Vec<String>,
}

/// Run one turn and stream its output as plain text.
#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }
    let session_id = required(request.session_id, "Session ID is required")?;
    if !state.orchestrator.backend().has_credentials() {
        return Err(ModelError::MissingCredentials.into());
    }

    let mut history = request.history;
    history.push(Message::user(request.message));

    let catalog = collect_tools(&state.registry, &session_id, &request.connected_servers).await;
    info!(session = %session_id, tools = catalog.len(), "chat turn");
    let turn = state.orchestrator.start(&session_id, history, catalog).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(turn),
    )
        .into_response())
}
