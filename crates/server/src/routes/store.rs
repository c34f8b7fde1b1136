//! Persisted chats and server configs.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use ::mcp::ServerConfig;
use serde::Deserialize;
use serde_json::{Value, json};
use storage::{ChatSession, ChatSummary, ImportReport, StoredServer};
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

pub async fn list_chats(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let Query(query) = query?;
    let chats = state.store.lock().await.list_chats(query.limit)?;
    Ok(Json(chats))
}

pub async fn save_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatSession>, JsonRejection>,
) -> ApiResult<Json<ChatSession>> {
    let Json(chat) = payload?;
    let saved = state.store.lock().await.save_chat(chat)?;
    Ok(Json(saved))
}

pub async fn load_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    let chat = state.store.lock().await.load_chat(&id)?;
    Ok(Json(chat))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.lock().await.delete_chat(&id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_servers(State(state): State<AppState>) -> ApiResult<Json<Vec<StoredServer>>> {
    let servers = state.store.lock().await.list_servers()?;
    Ok(Json(servers))
}

pub async fn save_server(
    State(state): State<AppState>,
    payload: Result<Json<ServerConfig>, JsonRejection>,
) -> ApiResult<Json<StoredServer>> {
    let Json(config) = payload?;
    let saved = state.store.lock().await.save_server(config)?;
    info!(server = %saved.id(), "server saved");
    Ok(Json(saved))
}

pub async fn load_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredServer>> {
    let server = state.store.lock().await.load_server(&id)?;
    Ok(Json(server))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.lock().await.delete_server(&id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn export_servers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let exported = state.store.lock().await.export_servers()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], exported))
}

/// Import a JSON array of configs. Per-item failures are reported, not fatal.
pub async fn import_servers(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<ImportReport>> {
    let report = state.store.lock().await.import_servers(&body)?;
    info!(imported = report.imported, errors = report.errors.len(), "servers imported");
    Ok(Json(report))
}
