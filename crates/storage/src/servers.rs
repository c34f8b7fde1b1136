//! Saved tool-server configurations.

use chrono::{DateTime, Utc};
use mcp::ServerConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tool-server config as kept in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredServer {
    #[serde(flatten)]
    pub config: ServerConfig,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl StoredServer {
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// Outcome of importing a batch of server configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub success: bool,
    pub imported: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub(crate) fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            imported: 0,
            errors: vec![error.into()],
        }
    }
}

pub(crate) fn new_server_id() -> String {
    format!("mcp-{}", Uuid::new_v4())
}
