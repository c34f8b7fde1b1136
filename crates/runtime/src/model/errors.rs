use thiserror::Error;

/// Errors from model provider calls.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// No credentials are configured for the provider.
    #[error("model API key is not configured")]
    MissingCredentials,

    /// The provider rejected the configured credentials.
    #[error("invalid API key: {0}")]
    Unauthorized(String),

    /// The provider is throttling requests.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The provider returned an error response.
    #[error("provider api ({status}): {message}")]
    Api { status: u16, message: String },

    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Classify a failed HTTP response.
    ///
    /// The status code decides first; provider messages mentioning the API
    /// key, a quota or a rate limit are classified the same way.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = error_message(body);
        match status {
            401 | 403 => Self::Unauthorized(message),
            429 => Self::RateLimited(message),
            _ => Self::classify(&message).unwrap_or(Self::Api { status, message }),
        }
    }

    /// Map an in-stream `error` event (`{"type": ..., "message": ...}`).
    pub fn from_stream_error(kind: &str, message: String) -> Self {
        match kind {
            "authentication_error" | "permission_error" => Self::Unauthorized(message),
            "rate_limit_error" => Self::RateLimited(message),
            _ => Self::classify(&message).unwrap_or(Self::Api {
                status: 500,
                message: format!("{kind}: {message}"),
            }),
        }
    }

    fn classify(message: &str) -> Option<Self> {
        let lower = message.to_ascii_lowercase();
        if lower.contains("api key") {
            Some(Self::Unauthorized(message.to_string()))
        } else if lower.contains("quota") || lower.contains("rate limit") {
            Some(Self::RateLimited(message.to_string()))
        } else {
            None
        }
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw
/// body with whitespace collapsed.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.split_whitespace().collect::<Vec<_>>().join(" "))
}
