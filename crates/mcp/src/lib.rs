//! MCP (Model Context Protocol) client library.
//!
//! This crate knows how to reach a tool server and talk to it:
//!
//! - [`ServerConfig`] / [`TransportConfig`] describe a server and how to
//!   reach it (local process, streamable HTTP or HTTP with server-sent events).
//! - [`TransportSelector`] validates a config against a [`policy::Policy`] and
//!   opens a connection within a deadline.
//! - [`ToolClient`] is the seam callers program against; [`McpClient`] is the
//!   implementation on top of `rmcp`.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{ServerConfig, TransportConfig, TransportSelector};
//! use policy::Policy;
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig {
//!     id: "fs".to_string(),
//!     name: "filesystem".to_string(),
//!     transport: TransportConfig::LocalProcess {
//!         command: "npx".to_string(),
//!         args: vec![
//!             "-y".to_string(),
//!             "@modelcontextprotocol/server-filesystem".to_string(),
//!             "/tmp".to_string(),
//!         ],
//!         env: Default::default(),
//!     },
//!     description: None,
//! };
//!
//! let client = TransportSelector::new(Policy::default()).open(&config).await?;
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod protocol;
mod transport;

pub use client::{McpClient, ToolClient};
pub use config::{ServerConfig, TransportConfig, TransportKind};
pub use error::{Error, Result};
pub use protocol::{
    CallOutcome, JsonObject, PromptArgument, PromptContent, PromptInfo, PromptMessage,
    ResourceContents, ResourceInfo, ToolContent, ToolInfo,
};
pub use transport::{DEFAULT_CONNECT_TIMEOUT, Launcher, RmcpLauncher, TransportSelector};
