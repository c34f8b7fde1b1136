//! HTTP routes.

mod chat;
mod mcp;
mod store;

use std::sync::Arc;

use ::mcp::ToolClient;
use axum::Router;
use axum::routing::{get, post};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Build the router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat::chat))
        .route("/api/mcp/connect", post(mcp::connect))
        .route("/api/mcp/disconnect", post(mcp::disconnect))
        .route("/api/mcp/sessions", get(mcp::sessions))
        .route("/api/mcp/stats", get(mcp::stats))
        .route("/api/mcp/tools", get(mcp::list_tools).post(mcp::call_tool))
        .route("/api/mcp/prompts", get(mcp::prompts))
        .route(
            "/api/mcp/resources",
            get(mcp::list_resources).post(mcp::read_resource),
        )
        .route("/api/chats", get(store::list_chats).post(store::save_chat))
        .route(
            "/api/chats/:id",
            get(store::load_chat).delete(store::delete_chat),
        )
        .route(
            "/api/servers",
            get(store::list_servers).post(store::save_server),
        )
        .route("/api/servers/export", get(store::export_servers))
        .route("/api/servers/import", post(store::import_servers))
        .route(
            "/api/servers/:id",
            get(store::load_server).delete(store::delete_server),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// A required, non-blank request field.
fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

/// The client of a connected handle; touches the session.
async fn connected_client(
    state: &AppState,
    session_id: &str,
    server_id: &str,
) -> ApiResult<Arc<dyn ToolClient>> {
    state
        .registry
        .get_handle(session_id, server_id)
        .await
        .and_then(|handle| handle.client().cloned())
        .ok_or_else(|| ApiError::NotFound("Client not connected".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use storage::Store;
    use tower::ServiceExt;

    pub(super) fn state() -> AppState {
        let mut config = Config::default();
        // Blank key: no environment fallback, so chat has no credentials.
        config.backend.api_key = Some(String::new());
        AppState::new(&config, Store::in_memory().unwrap())
    }

    pub(super) fn app() -> Router {
        router(state())
    }

    pub(super) async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub(super) async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    pub(super) fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    pub(super) fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(&app(), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let request = Request::post("/api/mcp/disconnect")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send_json(&app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[test]
    fn required_rejects_blank() {
        assert!(required(None, "x").is_err());
        assert!(required(Some("  ".into()), "x").is_err());
        assert_eq!(required(Some("s1".into()), "x").unwrap(), "s1");
    }
}
