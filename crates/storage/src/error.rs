use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl Error {
    pub(crate) fn chat(id: &str) -> Self {
        Self::NotFound {
            kind: "chat",
            id: id.to_string(),
        }
    }

    pub(crate) fn server(id: &str) -> Self {
        Self::NotFound {
            kind: "server",
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
