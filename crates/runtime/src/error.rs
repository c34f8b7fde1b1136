use crate::model::ModelError;
use thiserror::Error;

/// Failure of a connect attempt, as surfaced by the connector.
pub type ConnectError = mcp::Error;

/// Errors that end a turn's output stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TurnError {
    /// The upstream model stream failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The consumer of the output stream went away.
    #[error("turn cancelled")]
    Cancelled,
}

/// Errors from dispatching one function call.
///
/// These never end a turn; they are rendered inline as error markers.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("tool not found: {0}")]
    UnknownTool(String),

    #[error("server not connected: {0}")]
    NotConnected(String),

    #[error("execution failed: {0}")]
    Execution(String),
}
