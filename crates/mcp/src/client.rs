//! Tool client seam and its rmcp-backed implementation.

use async_trait::async_trait;
use rmcp::{
    RoleClient,
    model::{CallToolRequestParam, GetPromptRequestParam, ReadResourceRequestParam},
    service::{Peer, RunningService},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{
    CallOutcome, JsonObject, PromptContent, PromptInfo, ResourceContents, ResourceInfo, ToolInfo,
};

/// A live connection to one tool server.
///
/// The connection is exclusively owned by whoever holds the client; `close`
/// must be safe to call more than once and only tear the transport down on
/// the first call.
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> Result<CallOutcome>;

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>>;

    async fn get_prompt(&self, name: &str, arguments: Option<JsonObject>)
    -> Result<PromptContent>;

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>>;

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>>;

    async fn close(&self) -> Result<()>;
}

/// An MCP client connected through rmcp.
pub struct McpClient {
    name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpClient {
    pub(crate) fn new(name: impl Into<String>, service: RunningService<RoleClient, ()>) -> Self {
        Self {
            name: name.into(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }

    /// Name of the server this client talks to.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ToolClient for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let tools = self.peer.list_all_tools().await.map_err(service_error)?;
        convert(&tools)
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> Result<CallOutcome> {
        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        };
        let result = self.peer.call_tool(params).await.map_err(service_error)?;
        convert(&result)
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        let prompts = self.peer.list_all_prompts().await.map_err(service_error)?;
        convert(&prompts)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<PromptContent> {
        let params = GetPromptRequestParam {
            name: name.to_string(),
            arguments,
        };
        let result = self.peer.get_prompt(params).await.map_err(service_error)?;
        convert(&result)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let resources = self
            .peer
            .list_all_resources()
            .await
            .map_err(service_error)?;
        convert(&resources)
    }

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        let params = ReadResourceRequestParam {
            uri: uri.to_string(),
        };
        let result = self
            .peer
            .read_resource(params)
            .await
            .map_err(service_error)?;
        convert(&result.contents)
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        let reason = service
            .cancel()
            .await
            .map_err(|e| Error::Service(format!("shutdown of {} failed: {e}", self.name)))?;
        debug!(server = %self.name, ?reason, "closed MCP client");
        Ok(())
    }
}

fn service_error(err: rmcp::ServiceError) -> Error {
    match err {
        rmcp::ServiceError::TransportClosed => Error::Closed,
        other => Error::Service(other.to_string()),
    }
}

/// Re-shape an SDK value into this crate's schema types through JSON.
fn convert<T: Serialize, U: DeserializeOwned>(value: &T) -> Result<U> {
    let json = serde_json::to_value(value)?;
    Ok(serde_json::from_value(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct SdkTool {
        name: &'static str,
        #[serde(rename = "inputSchema")]
        input_schema: serde_json::Value,
        annotations: serde_json::Value,
    }

    #[test]
    fn convert_drops_unknown_fields() {
        let sdk = vec![SdkTool {
            name: "weather",
            input_schema: json!({"type": "object"}),
            annotations: json!({"readOnlyHint": true}),
        }];
        let tools: Vec<ToolInfo> = convert(&sdk).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "weather");
        assert!(tools[0].description.is_none());
    }

    #[test]
    fn convert_reports_shape_mismatch() {
        let err = convert::<_, Vec<ToolInfo>>(&json!({"not": "a list"})).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn transport_closed_maps_to_closed() {
        assert!(matches!(
            service_error(rmcp::ServiceError::TransportClosed),
            Error::Closed
        ));
    }
}
