//! Anthropic Messages API backend (streaming).

use crate::model::{
    Backend, Message, ModelError, ModelEvent, ModelRequest, ModelStream, Role, ToolCall, ToolSpec,
};
use futures::StreamExt;
use mcp::JsonObject;
use memchr::memchr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const STREAM_BUFFER: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: ApiBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: ApiDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: ApiMessageDelta,
    },
    MessageStop,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// A `tool_use` block whose input JSON is still arriving.
#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

impl PendingToolUse {
    fn finish(self) -> Result<ToolCall, ModelError> {
        let arguments = if self.input_json.trim().is_empty() {
            JsonObject::new()
        } else {
            match serde_json::from_str::<Value>(&self.input_json) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(ModelError::InvalidResponse(format!(
                        "tool input for {} is not an object: {other}",
                        self.name
                    )));
                }
                Err(e) => {
                    return Err(ModelError::InvalidResponse(format!(
                        "tool input for {}: {e}",
                        self.name
                    )));
                }
            }
        };
        Ok(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

/// Incremental decoder from the raw server-sent event body to model events.
///
/// Text deltas are yielded as they arrive. Completed `tool_use` blocks are
/// collected and yielded as one batch when the message ends.
#[derive(Debug, Default)]
struct StreamDecoder {
    buffer: Vec<u8>,
    data: String,
    pending: HashMap<usize, PendingToolUse>,
    calls: Vec<ToolCall>,
}

type Decoded = Vec<Result<ModelEvent, ModelError>>;

impl StreamDecoder {
    fn push(&mut self, chunk: &[u8]) -> Decoded {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match std::str::from_utf8(&line) {
                Ok(line) => self.line(line.trim_end_matches(['\n', '\r']), &mut out),
                Err(e) => out.push(Err(ModelError::InvalidResponse(format!(
                    "invalid UTF-8 in stream: {e}"
                )))),
            }
        }
        out
    }

    /// Flush whatever is buffered once the body has ended.
    fn finish(&mut self) -> Decoded {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            self.line(rest.trim_end_matches('\r'), &mut out);
        }
        self.dispatch(&mut out);
        self.flush_calls(&mut out);
        out
    }

    fn line(&mut self, line: &str, out: &mut Decoded) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if let Some(data) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(data.trim_start());
        }
        // `event:` repeats the JSON `type`; `id:`, `retry:` and comments are unused.
    }

    fn dispatch(&mut self, out: &mut Decoded) {
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data);
        match serde_json::from_str::<ApiStreamEvent>(&data) {
            Ok(event) => self.apply(event, out),
            Err(e) => out.push(Err(ModelError::InvalidResponse(format!(
                "bad stream event: {e}"
            )))),
        }
    }

    fn apply(&mut self, event: ApiStreamEvent, out: &mut Decoded) {
        match event {
            ApiStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ApiBlockStart::Text { text } if !text.is_empty() => {
                    out.push(Ok(ModelEvent::Text(text)));
                }
                ApiBlockStart::ToolUse { id, name } => {
                    self.pending.insert(
                        index,
                        PendingToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        },
                    );
                }
                _ => {}
            },
            ApiStreamEvent::ContentBlockDelta { index, delta } => match delta {
                ApiDelta::TextDelta { text } if !text.is_empty() => {
                    out.push(Ok(ModelEvent::Text(text)));
                }
                ApiDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.pending.get_mut(&index) {
                        pending.input_json.push_str(&partial_json);
                    }
                }
                _ => {}
            },
            ApiStreamEvent::ContentBlockStop { index } => {
                if let Some(pending) = self.pending.remove(&index) {
                    match pending.finish() {
                        Ok(call) => self.calls.push(call),
                        Err(e) => out.push(Err(e)),
                    }
                }
            }
            ApiStreamEvent::MessageDelta { delta } => {
                if let Some(reason) = delta.stop_reason {
                    debug!(stop_reason = %reason, "generation stopped");
                }
                self.flush_calls(out);
            }
            ApiStreamEvent::MessageStop => self.flush_calls(out),
            ApiStreamEvent::Error { error } => {
                out.push(Err(ModelError::from_stream_error(&error.kind, error.message)));
            }
            ApiStreamEvent::Other => {}
        }
    }

    fn flush_calls(&mut self, out: &mut Decoded) {
        if !self.calls.is_empty() {
            out.push(Ok(ModelEvent::ToolCalls(std::mem::take(&mut self.calls))));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    api_url: String,
}

impl AnthropicBackendBuilder {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            max_tokens: 4096,
            system: None,
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Override the Messages endpoint (proxies, gateways).
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
            system: self.system,
            api_url: self.api_url,
        }
    }
}

/// Anthropic API backend.
///
/// A backend without an API key can be constructed; every request then
/// fails with [`ModelError::MissingCredentials`].
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    api_url: String,
}

impl AnthropicBackend {
    pub fn builder(api_key: Option<String>, model: impl Into<String>) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key, model)
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Model => "assistant",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage<'_> {
        ApiMessage {
            role: Self::role_to_api(msg.role),
            content: &msg.content,
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            name: &spec.name,
            description: &spec.description,
            input_schema: &spec.schema,
        }
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl Backend for AnthropicBackend {
    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingCredentials)?;

        let api_request = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: request
                .messages
                .iter()
                .filter(|m| !m.content.is_empty())
                .map(Self::message_to_api)
                .collect(),
            system: self.system.as_deref(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: true,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), &body));
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut body = response.bytes_stream().boxed();
        tokio::spawn(async move {
            let mut decoder = StreamDecoder::default();
            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => {
                        debug!("model stream consumer went away");
                        return;
                    }
                    chunk = body.next() => chunk,
                };
                let items = match chunk {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => vec![Err(ModelError::Network(e.to_string()))],
                    None => break,
                };
                if !forward(&tx, items).await {
                    return;
                }
            }
            forward(&tx, decoder.finish()).await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Send decoded items; returns false once the stream is over (receiver gone
/// or an error was delivered).
async fn forward(
    tx: &mpsc::Sender<Result<ModelEvent, ModelError>>,
    items: Decoded,
) -> bool {
    for item in items {
        let failed = item.is_err();
        if let Err(e) = &item {
            warn!(error = %e, "model stream error");
        }
        if tx.send(item).await.is_err() || failed {
            return false;
        }
    }
    true
}
