//! Server error types.

use std::path::PathBuf;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use runtime::ModelError;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;

/// Errors answered by the HTTP API.
///
/// Every variant renders as a JSON body `{error, details?}` except
/// [`ApiError::Connect`], which keeps the `{success: false, error}` shape
/// connect callers expect.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// A request field is missing or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// No connected handle, or no stored record.
    #[error("{0}")]
    NotFound(String),

    /// A connect attempt failed.
    #[error(transparent)]
    Connect(mcp::Error),

    /// A call to a connected tool server failed.
    #[error("{context}: {source}")]
    Tool {
        context: &'static str,
        source: mcp::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn tool(context: &'static str) -> impl FnOnce(mcp::Error) -> Self {
        move |source| Self::Tool { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Connect(e) if e.is_config_error() => StatusCode::BAD_REQUEST,
            Self::Connect(_) | Self::Tool { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Model(ModelError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            Self::Model(ModelError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            Self::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(storage::Error::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::BadRequest(message) | Self::NotFound(message) => json!({ "error": message }),
            Self::Connect(e) => json!({ "success": false, "error": e.to_string() }),
            Self::Tool { context, source } => json!({
                "error": context,
                "details": source.to_string(),
            }),
            Self::Model(ModelError::MissingCredentials) => {
                json!({ "error": "ANTHROPIC_API_KEY is not configured" })
            }
            Self::Model(ModelError::Unauthorized(details)) => {
                json!({ "error": "Invalid API key", "details": details })
            }
            Self::Model(ModelError::RateLimited(details)) => json!({
                "error": "Rate limit exceeded. Please try again later.",
                "details": details,
            }),
            Self::Model(e) => json!({
                "error": "Failed to process request",
                "details": e.to_string(),
            }),
            Self::Storage(e @ storage::Error::NotFound { .. }) => json!({ "error": e.to_string() }),
            Self::Storage(e) => json!({
                "error": "Storage failure",
                "details": e.to_string(),
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors from the command-line entry points.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database file does not exist yet.
    #[error("database not found at {path}. Run 'deckhand serve' first")]
    DatabaseNotFound { path: PathBuf },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
