//! Chat history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a chat that has no user message yet.
pub const DEFAULT_TITLE: &str = "New chat";

const TITLE_MAX_CHARS: usize = 30;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "assistant")]
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "model" | "assistant" => Some(Role::Model),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted chat message. Timestamps are epoch milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A saved conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// An empty chat with a fresh id and the default title.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a chat for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Derive a chat title from the first user message: trimmed, cut to 30
/// characters with a trailing `...` when longer.
pub fn session_title(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == Role::User) else {
        return DEFAULT_TITLE.to_string();
    };

    let content = first.content.trim();
    if content.chars().count() <= TITLE_MAX_CHARS {
        return content.to_string();
    }

    let cut: String = content.chars().take(TITLE_MAX_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_defaults_without_user_message() {
        assert_eq!(session_title(&[]), DEFAULT_TITLE);
        assert_eq!(session_title(&[Message::model("hi there")]), DEFAULT_TITLE);
    }

    #[test]
    fn title_uses_first_user_message() {
        let messages = vec![
            Message::model("Welcome"),
            Message::user("  What's the weather?  "),
            Message::user("second"),
        ];
        assert_eq!(session_title(&messages), "What's the weather?");
    }

    #[test]
    fn long_title_is_cut_on_characters() {
        let long = "서울의 날씨를 알려주세요. 내일과 모레의 예보도 함께 보여주세요.";
        let title = session_title(&[Message::user(long)]);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 33);

        let exact = "a".repeat(30);
        assert_eq!(session_title(&[Message::user(exact.clone())]), exact);
    }

    #[test]
    fn message_wire_format() {
        let json = r#"{"id": "m1", "role": "model", "content": "hi", "timestamp": 1700000000000}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::Model);
        assert_eq!(msg.timestamp.timestamp_millis(), 1_700_000_000_000);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
        assert_eq!(value["role"], "model");
    }

    #[test]
    fn history_entries_need_only_role_and_content() {
        let msg: Message = serde_json::from_str(r#"{"role": "user", "content": "hi"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn assistant_is_accepted_as_model() {
        let role: Role = serde_json::from_str(r#""assistant""#).unwrap();
        assert_eq!(role, Role::Model);
        assert_eq!(Role::parse("assistant"), Some(Role::Model));
        assert_eq!(Role::parse("system"), None);
    }
}
