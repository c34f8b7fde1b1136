//! MCP error types.

use std::time::Duration;

use thiserror::Error;

use crate::config::TransportKind;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("command not allowed for local-process transport: {0:?}")]
    DisallowedCommand(String),

    #[error("host not allowed: {0}")]
    DisallowedHost(String),

    #[error("{0} transport requires URL")]
    MissingUrl(TransportKind),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("failed to spawn server: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("tool server error: {0}")]
    Service(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("client closed")]
    Closed,
}

impl Error {
    /// Whether the error stems from the server configuration itself rather
    /// than from talking to the server.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::DisallowedCommand(_)
                | Self::DisallowedHost(_)
                | Self::MissingUrl(_)
                | Self::InvalidUrl { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
