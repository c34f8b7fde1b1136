//! Tool-protocol value types exposed by this crate.
//!
//! These mirror the MCP schema shapes callers care about (camelCase on the
//! wire) without tying downstream crates to a particular SDK version.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON object used for tool and prompt arguments.
pub type JsonObject = serde_json::Map<String, Value>;

/// Tool definition returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallOutcome {
    /// A successful outcome with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Concatenated text parts, newline separated. Non-text parts are skipped.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ToolContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Content returned by a tool.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ToolContent {
    /// Get text content if this is a text content block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Prompt template advertised by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PromptContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: Value,
}

/// Resource advertised by `resources/list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One entry of a `resources/read` result. Exactly one of `text` and `blob`
/// is normally set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_tool() {
        let json = r#"{
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        }"#;
        let tool: ToolInfo = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn text_content_skips_non_text_parts() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "22C"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "resource_link", "uri": "file:///x"},
                {"type": "text", "text": "sunny"}
            ],
            "isError": false
        }"#;
        let outcome: CallOutcome = serde_json::from_str(json).unwrap();
        assert_eq!(outcome.content.len(), 4);
        assert_eq!(outcome.content[2], ToolContent::Unknown);
        assert_eq!(outcome.text_content(), "22C\nsunny");
    }

    #[test]
    fn missing_is_error_defaults_to_false() {
        let outcome: CallOutcome = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(!outcome.is_error);
        assert_eq!(outcome.text_content(), "");
    }

    #[test]
    fn resource_contents_keep_text_or_blob() {
        let json = r#"[
            {"uri": "file:///a.txt", "mimeType": "text/plain", "text": "hello"},
            {"uri": "file:///b.bin", "blob": "AAE="}
        ]"#;
        let contents: Vec<ResourceContents> = serde_json::from_str(json).unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("hello"));
        assert_eq!(contents[1].blob.as_deref(), Some("AAE="));
        assert!(contents[1].mime_type.is_none());
    }
}
