use super::errors::ModelError;
use futures::stream::BoxStream;
use mcp::{JsonObject, ToolInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

pub use storage::Role;

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

impl From<&storage::Message> for Message {
    fn from(message: &storage::Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// A tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl From<ToolInfo> for ToolSpec {
    fn from(tool: ToolInfo) -> Self {
        let schema = if tool.input_schema.is_object() {
            tool.input_schema
        } else {
            serde_json::json!({"type": "object", "properties": {}})
        };
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            schema,
        }
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: JsonObject,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: JsonObject) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            arguments,
        }
    }
}

/// One increment of a streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Generated text, to be forwarded as is.
    Text(String),
    /// A batch of function calls, in the order the model emitted them.
    ToolCalls(Vec<ToolCall>),
}

/// Incremental output of one generation.
pub type ModelStream = BoxStream<'static, Result<ModelEvent, ModelError>>;

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

impl<'a> ModelRequest<'a> {
    pub fn new(messages: &'a [Message], tools: &'a [ToolSpec]) -> Self {
        Self { messages, tools }
    }
}

/// Trait for model provider backends.
///
/// Errors that happen before any output is produced (credentials, HTTP
/// status) are returned from `stream` itself; later failures arrive as
/// `Err` items on the stream.
pub trait Backend: Send + Sync {
    fn stream(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelStream, ModelError>> + Send;
}
