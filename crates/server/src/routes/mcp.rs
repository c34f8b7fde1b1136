//! Tool-server connection and capability endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use ::mcp::{CallOutcome, JsonObject, ServerConfig};
use runtime::{HandleSummary, RegistryStats};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::{connected_client, required};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    session_id: Option<String>,
    server_id: Option<String>,
    config: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRef {
    session_id: Option<String>,
    server_id: Option<String>,
}

impl ServerRef {
    fn ids(self) -> ApiResult<(String, String)> {
        match (self.session_id, self.server_id) {
            (Some(session), Some(server)) if !session.is_empty() && !server.is_empty() => {
                Ok((session, server))
            }
            _ => Err(ApiError::bad_request(
                "Session ID and Server ID are required",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolRequest {
    session_id: Option<String>,
    server_id: Option<String>,
    tool_name: Option<String>,
    arguments: Option<JsonObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptQuery {
    session_id: Option<String>,
    server_id: Option<String>,
    prompt_name: Option<String>,
    /// JSON-encoded prompt arguments.
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceRequest {
    session_id: Option<String>,
    server_id: Option<String>,
    uri: Option<String>,
}

#[instrument(skip_all)]
pub async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let session_id = required(request.session_id, "Session ID is required")?;
    let server_id = required(request.server_id, "Server ID is required")?;
    let config = request
        .config
        .ok_or_else(|| ApiError::bad_request("Server configuration is required"))?;
    let mut config: ServerConfig = serde_json::from_value(config)
        .map_err(|e| ApiError::bad_request(format!("Invalid server configuration: {e}")))?;
    if config.id.is_empty() {
        config.id = server_id.clone();
    }

    info!(session = %session_id, server = %server_id, transport = %config.kind(), "connect requested");
    state
        .connector
        .connect(&session_id, &server_id, config)
        .await
        .map_err(ApiError::Connect)?;
    Ok(Json(json!({ "success": true })))
}

#[instrument(skip_all)]
pub async fn disconnect(
    State(state): State<AppState>,
    payload: Result<Json<ServerRef>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let session_id = required(request.session_id, "Session ID is required")?;
    let server_id = required(request.server_id, "Server ID is required")?;

    state.connector.disconnect(&session_id, &server_id).await;
    Ok(Json(json!({ "success": true })))
}

pub async fn sessions(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let session_id = required(query.session_id, "Session ID is required")?;

    let connected: Vec<HandleSummary> = state
        .registry
        .handles(&session_id)
        .await
        .iter()
        .map(|handle| handle.summary())
        .collect();
    Ok(Json(json!({ "connectedServers": connected })))
}

pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.stats().await)
}

pub async fn list_tools(
    State(state): State<AppState>,
    query: Result<Query<ServerRef>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (session_id, server_id) = query.ids()?;
    let client = connected_client(&state, &session_id, &server_id).await?;

    let tools = client
        .list_tools()
        .await
        .map_err(ApiError::tool("Failed to list tools"))?;
    Ok(Json(json!({ "tools": tools })))
}

#[instrument(skip_all)]
pub async fn call_tool(
    State(state): State<AppState>,
    payload: Result<Json<CallToolRequest>, JsonRejection>,
) -> ApiResult<Json<CallOutcome>> {
    let Json(request) = payload?;
    let (Some(session_id), Some(server_id), Some(tool_name)) =
        (request.session_id, request.server_id, request.tool_name)
    else {
        return Err(ApiError::bad_request(
            "Session ID, Server ID and tool name are required",
        ));
    };
    let client = connected_client(&state, &session_id, &server_id).await?;

    let outcome = client
        .call_tool(&tool_name, request.arguments)
        .await
        .map_err(ApiError::tool("Failed to call tool"))?;
    Ok(Json(outcome))
}

pub async fn prompts(
    State(state): State<AppState>,
    query: Result<Query<PromptQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (session_id, server_id) = ServerRef {
        session_id: query.session_id,
        server_id: query.server_id,
    }
    .ids()?;
    let client = connected_client(&state, &session_id, &server_id).await?;

    let Some(name) = query.prompt_name else {
        let prompts = client
            .list_prompts()
            .await
            .map_err(ApiError::tool("Failed to get prompts"))?;
        return Ok(Json(json!({ "prompts": prompts })));
    };

    let arguments = query
        .arguments
        .map(|raw| serde_json::from_str::<JsonObject>(&raw))
        .transpose()
        .map_err(|e| ApiError::bad_request(format!("Invalid prompt arguments: {e}")))?;
    let prompt = client
        .get_prompt(&name, arguments)
        .await
        .map_err(ApiError::tool("Failed to get prompts"))?;
    Ok(Json(json!({ "prompt": prompt })))
}

pub async fn list_resources(
    State(state): State<AppState>,
    query: Result<Query<ServerRef>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (session_id, server_id) = query.ids()?;
    let client = connected_client(&state, &session_id, &server_id).await?;

    let resources = client
        .list_resources()
        .await
        .map_err(ApiError::tool("Failed to list resources"))?;
    Ok(Json(json!({ "resources": resources })))
}

pub async fn read_resource(
    State(state): State<AppState>,
    payload: Result<Json<ReadResourceRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let (Some(session_id), Some(server_id), Some(uri)) =
        (request.session_id, request.server_id, request.uri)
    else {
        return Err(ApiError::bad_request(
            "Session ID, Server ID and URI are required",
        ));
    };
    let client = connected_client(&state, &session_id, &server_id).await?;

    let contents = client
        .read_resource(&uri)
        .await
        .map_err(ApiError::tool("Failed to read resource"))?;
    Ok(Json(json!({ "contents": contents })))
}
