//! Deckhand runtime: tool-server connections and streaming turns.
//!
//! This crate holds the moving parts between the HTTP surface and the
//! outside world: live tool-server connections per session, and the turn
//! loop that streams a model generation while dispatching its tool calls.
//!
//! # Overview
//!
//! - **SessionRegistry**: connection handles keyed by session and server,
//!   with idle eviction by a background sweeper.
//! - **Connector**: validates a server config, opens its transport under a
//!   deadline and records the outcome in the registry.
//! - **collect_tools**: merges the tool declarations of a session's servers
//!   into a [`ToolCatalog`].
//! - **Orchestrator**: runs one turn against a [`Backend`], producing a
//!   [`TurnStream`] of text and tool markers (see [`marker`]).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use mcp::TransportSelector;
//! use policy::Policy;
//! use runtime::{AnthropicBackendBuilder, Connector, Message, Orchestrator, SessionRegistry};
//!
//! # async fn example(config: mcp::ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::default();
//! let connector = Connector::new(registry.clone(), TransportSelector::new(Policy::default()));
//! connector.connect("session-1", "weather", config).await?;
//!
//! let backend = AnthropicBackendBuilder::new(None, "claude-sonnet-4-20250514").build();
//! let orchestrator = Orchestrator::new(Arc::new(backend), registry.clone());
//! let catalog = runtime::collect_tools(&registry, "session-1", &["weather".into()]).await;
//! let mut turn = orchestrator
//!     .start("session-1", vec![Message::user("Weather in Seoul?")], catalog)
//!     .await?;
//! while let Some(chunk) = turn.next().await {
//!     print!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

mod catalog;
mod connector;
mod error;
pub mod marker;
pub mod model;
mod output;
pub mod providers;
mod registry;
mod turn;

#[cfg(test)]
mod testing;

pub use catalog::{ToolCatalog, collect_tools};
pub use connector::Connector;
pub use error::{ConnectError, DispatchError, TurnError};
pub use model::{Backend, Message, ModelError, ModelEvent, ModelRequest, ModelStream, Role};
pub use model::{ToolCall, ToolSpec};
pub use output::{TurnOutput, TurnStream};
pub use providers::{AnthropicBackend, AnthropicBackendBuilder};
pub use registry::{
    ClientHandle, ConnectionStatus, DEFAULT_IDLE_TIMEOUT, DEFAULT_SWEEP_INTERVAL, HandleSummary,
    RegistryConfig, RegistryStats, SessionInfo, SessionRegistry, SweeperHandle,
};
pub use turn::{DEFAULT_MAX_TOOL_ROUNDS, Orchestrator, TurnConfig};
