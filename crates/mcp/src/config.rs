//! Tool-server configuration.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Configuration for an MCP tool server, as applied at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServerConfig {
    /// The transport kind of this server.
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

/// Transport-specific connection parameters.
///
/// Each variant carries only the fields its transport needs. The wire tag
/// (`transportType`) keeps the names the browser client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transportType")]
pub enum TransportConfig {
    /// A child process speaking MCP over stdin/stdout.
    #[serde(rename = "stdio")]
    LocalProcess {
        #[serde(default)]
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Streamable HTTP transport.
    #[serde(rename = "http")]
    HttpStream {
        #[serde(default)]
        url: String,
    },
    /// Legacy HTTP + server-sent events transport.
    #[serde(rename = "sse")]
    HttpEvents {
        #[serde(default)]
        url: String,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::LocalProcess { .. } => TransportKind::LocalProcess,
            Self::HttpStream { .. } => TransportKind::HttpStream,
            Self::HttpEvents { .. } => TransportKind::HttpEvents,
        }
    }
}

/// Discriminant of [`TransportConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    LocalProcess,
    HttpStream,
    HttpEvents,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalProcess => "stdio",
            Self::HttpStream => "http",
            Self::HttpEvents => "sse",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_stdio_config() {
        let json = r#"{
            "id": "mcp-1",
            "name": "filesystem",
            "transportType": "stdio",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "env": {"DEBUG": "1"},
            "createdAt": 1700000000000
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), TransportKind::LocalProcess);
        let TransportConfig::LocalProcess { command, args, env } = &config.transport else {
            panic!("expected local process transport");
        };
        assert_eq!(command, "npx");
        assert_eq!(args.len(), 3);
        assert_eq!(env.get("DEBUG").map(String::as_str), Some("1"));
    }

    #[test]
    fn deserialize_http_config_without_url() {
        let json = r#"{"name": "remote", "transportType": "sse"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::HttpEvents { url: String::new() }
        );
        assert_eq!(config.id, "");
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let json = r#"{"name": "x", "transportType": "websocket"}"#;
        assert!(serde_json::from_str::<ServerConfig>(json).is_err());
    }

    #[test]
    fn serializes_wire_tag() {
        let config = ServerConfig {
            id: "s".into(),
            name: "search".into(),
            transport: TransportConfig::HttpStream {
                url: "https://example.com/mcp".into(),
            },
            description: None,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["transportType"], "http");
        assert_eq!(json["url"], "https://example.com/mcp");
        assert!(json.get("description").is_none());
    }
}
