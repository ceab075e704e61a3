//! Notifications for presentation layers.

use serde::Serialize;
use uuid::Uuid;

use super::session::{SessionId, SessionOutcome, StreamPhase};
use crate::models::Message;

/// Capacity of the broadcast channel; slow subscribers see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Conversation change, serialized as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    MessageAdded {
        message: Message,
    },
    /// Text appended to a streaming message.
    MessageDelta {
        session_id: SessionId,
        message_id: Uuid,
        delta: String,
    },
    /// A message changed in place (terminal content, streaming flag).
    MessageUpdated {
        message: Message,
    },
    PhaseChanged {
        session_id: SessionId,
        phase: StreamPhase,
    },
    SessionFinished {
        session_id: SessionId,
        message_id: Uuid,
        outcome: SessionOutcome,
    },
    Cleared,
}
