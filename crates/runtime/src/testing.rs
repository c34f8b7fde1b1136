//! Test doubles for tool servers and model backends.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use mcp::{
    CallOutcome, JsonObject, Launcher, PromptContent, PromptInfo, ResourceContents, ResourceInfo,
    ServerConfig, ToolClient, ToolInfo, TransportConfig,
};

use crate::model::{Backend, Message, ModelError, ModelEvent, ModelRequest, ModelStream};

pub(crate) fn server_config(id: &str) -> ServerConfig {
    ServerConfig {
        id: id.to_string(),
        name: id.to_string(),
        transport: TransportConfig::HttpStream {
            url: format!("https://{id}.example.com/mcp"),
        },
        description: None,
    }
}

pub(crate) fn args(value: serde_json::Value) -> JsonObject {
    value.as_object().cloned().unwrap_or_default()
}

enum Reply {
    Outcome(CallOutcome),
    Failure(String),
    Never,
}

/// Tool client with canned tools and replies.
#[derive(Default)]
pub(crate) struct FakeClient {
    tools: Vec<ToolInfo>,
    replies: HashMap<String, Reply>,
    broken_listing: bool,
    calls: Mutex<Vec<(String, JsonObject)>>,
    closes: AtomicUsize,
}

impl FakeClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn declare(&mut self, name: &str) {
        self.tools.push(ToolInfo {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: serde_json::json!({"type": "object"}),
        });
    }

    /// A tool answering with one text part.
    pub(crate) fn tool(mut self, name: &str, text: &str) -> Self {
        self.declare(name);
        self.replies
            .insert(name.to_string(), Reply::Outcome(CallOutcome::text(text)));
        self
    }

    /// A tool whose outcome is flagged as an error by the server.
    pub(crate) fn flagged_tool(mut self, name: &str, text: &str) -> Self {
        self.declare(name);
        let mut outcome = CallOutcome::text(text);
        outcome.is_error = true;
        self.replies.insert(name.to_string(), Reply::Outcome(outcome));
        self
    }

    /// A tool whose invocation fails at the transport level.
    pub(crate) fn failing_tool(mut self, name: &str, message: &str) -> Self {
        self.declare(name);
        self.replies
            .insert(name.to_string(), Reply::Failure(message.to_string()));
        self
    }

    /// A tool whose invocation never completes.
    pub(crate) fn hanging_tool(mut self, name: &str) -> Self {
        self.declare(name);
        self.replies.insert(name.to_string(), Reply::Never);
        self
    }

    pub(crate) fn broken_listing(mut self) -> Self {
        self.broken_listing = true;
        self
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<(String, JsonObject)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolClient for FakeClient {
    async fn list_tools(&self) -> mcp::Result<Vec<ToolInfo>> {
        if self.broken_listing {
            return Err(mcp::Error::Service("tools/list failed".into()));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> mcp::Result<CallOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.unwrap_or_default()));
        match self.replies.get(name) {
            Some(Reply::Outcome(outcome)) => Ok(outcome.clone()),
            Some(Reply::Failure(message)) => Err(mcp::Error::Service(message.clone())),
            Some(Reply::Never) => std::future::pending().await,
            None => Err(mcp::Error::Service(format!("unknown tool {name}"))),
        }
    }

    async fn list_prompts(&self) -> mcp::Result<Vec<PromptInfo>> {
        Ok(Vec::new())
    }

    async fn get_prompt(&self, name: &str, _: Option<JsonObject>) -> mcp::Result<PromptContent> {
        Err(mcp::Error::Service(format!("no prompt {name}")))
    }

    async fn list_resources(&self) -> mcp::Result<Vec<ResourceInfo>> {
        Ok(Vec::new())
    }

    async fn read_resource(&self, _: &str) -> mcp::Result<Vec<ResourceContents>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> mcp::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher handing out fresh [`FakeClient`]s after an optional delay.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    delay: Duration,
    failure: Option<String>,
    launched: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeLauncher {
    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(message.to_string()),
            ..Default::default()
        })
    }

    pub(crate) fn launched(&self) -> Vec<Arc<FakeClient>> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _config: &ServerConfig) -> mcp::Result<Arc<dyn ToolClient>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(mcp::Error::Handshake(message.clone()));
        }
        let client = FakeClient::default().tool("echo", "ok").shared();
        self.launched.lock().unwrap().push(client.clone());
        Ok(client)
    }
}

/// One scripted generation.
pub(crate) enum Script {
    /// Yield these items, then end.
    Events(Vec<Result<ModelEvent, ModelError>>),
    /// Yield these items, then never end.
    Hang(Vec<Result<ModelEvent, ModelError>>),
    /// Fail before streaming.
    Fail(ModelError),
}

/// What a backend was asked for.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Backend replaying scripts in order; extra requests get an empty stream.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub(crate) fn text(s: &str) -> Result<ModelEvent, ModelError> {
    Ok(ModelEvent::Text(s.to_string()))
}

pub(crate) fn call(name: &str, arguments: serde_json::Value) -> Result<ModelEvent, ModelError> {
    Ok(ModelEvent::ToolCalls(vec![crate::model::ToolCall::new(
        name,
        args(arguments),
    )]))
}

impl Backend for ScriptedBackend {
    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            None => Ok(stream::empty().boxed()),
            Some(Script::Events(items)) => Ok(stream::iter(items).boxed()),
            Some(Script::Hang(items)) => Ok(stream::iter(items).chain(stream::pending()).boxed()),
            Some(Script::Fail(err)) => Err(err),
        }
    }
}
