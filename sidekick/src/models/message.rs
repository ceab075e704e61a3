//! Message model representing one turn in a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the assistant.
    Assistant,
    /// System message (context prompt). Sent to the model, never rendered.
    System,
}

impl MessageRole {
    /// Wire name used by chat completion APIs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an entry is part of the dialogue or an ephemeral status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A real conversational turn.
    #[default]
    Chat,
    /// Status/navigation entry shown in the log only; never sent to the model.
    Notice,
}

/// A message in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Time-ordered identifier (`UUIDv7`), used to correlate streaming updates.
    pub id: Uuid,
    /// Role of the message sender.
    pub role: MessageRole,
    /// Chat turn or notice.
    #[serde(default)]
    pub kind: MessageKind,
    /// Text body; grows while streaming.
    pub content: String,
    /// True while a response is still being produced for this message.
    #[serde(default)]
    pub streaming: bool,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new chat message with a fresh id.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            kind: MessageKind::Chat,
            content: content.into(),
            streaming: false,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// A status line for the UI log.
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Notice,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Whether presentation should show this entry.
    pub fn is_visible(&self) -> bool {
        self.role != MessageRole::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_names_match_serde() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(serde_json::to_value(role).unwrap(), role.as_str());
            assert_eq!(role.to_string(), role.as_str());
        }
    }

    #[test]
    fn ids_are_unique_and_time_ordered() {
        let first = Message::user("a");
        let second = Message::user("b");
        assert_ne!(first.id, second.id);
        assert!(first.id < second.id);
    }

    #[test]
    fn system_messages_are_hidden() {
        assert!(!Message::system("context").is_visible());
        assert!(Message::notice("loaded").is_visible());
        assert_eq!(Message::notice("loaded").kind, MessageKind::Notice);
    }
}
