//! Turn orchestration.
//!
//! A turn streams one model generation into a [`TurnStream`]. Text is
//! forwarded as it arrives. A batch of tool calls is dispatched in order,
//! each producing a result or error marker, and every successful result is
//! narrated by a follow-up generation made without tool declarations.
//! Consumption of the upstream stream then resumes.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::catalog::ToolCatalog;
use crate::error::{DispatchError, TurnError};
use crate::model::{Backend, Message, ModelError, ModelEvent, ModelRequest, ModelStream, ToolCall};
use crate::output::{self, TurnOutput, TurnStream};
use crate::registry::SessionRegistry;

/// Default number of tool dispatch rounds per turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnConfig {
    /// Tool-call batches executed per turn. Later batches are dropped.
    pub max_tool_rounds: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Runs turns against a model backend and a session registry.
pub struct Orchestrator<B> {
    backend: Arc<B>,
    registry: SessionRegistry,
    config: TurnConfig,
}

impl<B> Clone for Orchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            registry: self.registry.clone(),
            config: self.config,
        }
    }
}

impl<B: Backend + 'static> Orchestrator<B> {
    pub fn new(backend: Arc<B>, registry: SessionRegistry) -> Self {
        Self {
            backend,
            registry,
            config: TurnConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start a turn over `history`, which ends with the new user message.
    ///
    /// Errors opening the initial generation are returned here, before any
    /// output exists. Everything after that is reported through the stream.
    pub async fn start(
        &self,
        session_id: &str,
        history: Vec<Message>,
        catalog: ToolCatalog,
    ) -> Result<TurnStream, ModelError> {
        let upstream = self
            .backend
            .stream(ModelRequest::new(&history, &catalog.declarations))
            .await?;

        info!(session = %session_id, tools = catalog.len(), "turn started");
        let (output, stream) = output::channel();
        let turn = Turn {
            backend: self.backend.clone(),
            registry: self.registry.clone(),
            config: self.config,
            session_id: session_id.to_string(),
            history,
            catalog,
            output,
        };
        tokio::spawn(turn.drive(upstream));
        Ok(stream)
    }
}

struct Turn<B> {
    backend: Arc<B>,
    registry: SessionRegistry,
    config: TurnConfig,
    session_id: String,
    history: Vec<Message>,
    catalog: ToolCatalog,
    output: TurnOutput,
}

impl<B: Backend> Turn<B> {
    async fn drive(self, mut upstream: ModelStream) {
        let mut rounds = 0;
        loop {
            let item = tokio::select! {
                _ = self.output.closed() => {
                    debug!(session = %self.session_id, "turn cancelled");
                    return;
                }
                item = upstream.next() => item,
            };

            let step = match item {
                None => break,
                Some(Ok(ModelEvent::Text(text))) => self.output.text(text).await,
                Some(Ok(ModelEvent::ToolCalls(calls))) if calls.is_empty() => Ok(()),
                Some(Ok(ModelEvent::ToolCalls(calls))) => {
                    if rounds >= self.config.max_tool_rounds {
                        warn!(
                            session = %self.session_id,
                            calls = calls.len(),
                            "tool round limit reached, dropping calls"
                        );
                        Ok(())
                    } else {
                        rounds += 1;
                        self.dispatch_round(calls).await
                    }
                }
                Some(Err(e)) => {
                    warn!(session = %self.session_id, error = %e, "model stream failed");
                    self.output.fail(TurnError::Model(e)).await;
                    return;
                }
            };

            if let Err(e) = step {
                debug!(session = %self.session_id, error = %e, "turn stopped");
                return;
            }
        }
        info!(session = %self.session_id, rounds, "turn complete");
    }

    async fn dispatch_round(&self, calls: Vec<ToolCall>) -> Result<(), TurnError> {
        let mut results = Vec::new();
        for call in calls {
            let outcome = tokio::select! {
                _ = self.output.closed() => return Err(TurnError::Cancelled),
                outcome = self.dispatch(&call) => outcome,
            };
            match outcome {
                Ok(body) => {
                    self.output.tool_result(&call.name, &body).await?;
                    results.push((call.name, body));
                }
                Err(e) => {
                    warn!(session = %self.session_id, tool = %call.name, error = %e, "tool call failed");
                    self.output.tool_error(&call.name, &e.to_string()).await?;
                }
            }
        }

        for (name, body) in &results {
            self.follow_up(name, body).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<String, DispatchError> {
        let server_id = self
            .catalog
            .owner(&call.name)
            .ok_or_else(|| DispatchError::UnknownTool(call.name.clone()))?;

        let client = self
            .registry
            .get_handle(&self.session_id, server_id)
            .await
            .and_then(|handle| handle.client().cloned())
            .ok_or_else(|| DispatchError::NotConnected(server_id.to_string()))?;

        debug!(session = %self.session_id, server = %server_id, tool = %call.name, "calling tool");
        let outcome = client
            .call_tool(&call.name, Some(call.arguments.clone()))
            .await
            .map_err(|e| DispatchError::Execution(e.to_string()))?;

        if outcome.is_error {
            return Err(DispatchError::Execution(outcome.text_content()));
        }
        Ok(outcome.text_content())
    }

    /// Narrate one tool result. Failures are logged and skipped.
    async fn follow_up(&self, tool: &str, result: &str) -> Result<(), TurnError> {
        let mut messages = self.history.clone();
        messages.push(Message::user(follow_up_prompt(tool, result)));

        let mut stream = match self.backend.stream(ModelRequest::new(&messages, &[])).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = %self.session_id, tool, error = %e, "follow-up failed");
                return Ok(());
            }
        };

        loop {
            let item = tokio::select! {
                _ = self.output.closed() => return Err(TurnError::Cancelled),
                item = stream.next() => item,
            };
            match item {
                None => return Ok(()),
                Some(Ok(ModelEvent::Text(text))) => self.output.text(text).await?,
                Some(Ok(ModelEvent::ToolCalls(calls))) => {
                    warn!(session = %self.session_id, calls = calls.len(), "ignoring tool calls in follow-up");
                }
                Some(Err(e)) => {
                    warn!(session = %self.session_id, tool, error = %e, "follow-up stream failed");
                    return Ok(());
                }
            }
        }
    }
}

fn follow_up_prompt(tool: &str, result: &str) -> String {
    format!(
        "The tool \"{tool}\" returned the following result:\n\n{result}\n\n\
         Answer my previous message in natural language using this result."
    )
}
