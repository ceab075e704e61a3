//! Conversation state and the streaming state machine.

mod conversation;
mod events;
mod orchestrator;
mod session;

use async_trait::async_trait;

pub use conversation::ConversationState;
pub use events::{ConversationEvent, EVENT_CHANNEL_CAPACITY};
pub use orchestrator::{ConversationSnapshot, OrchestratorOptions, StreamOrchestrator};
pub use session::{SendTicket, SessionId, SessionOutcome, StreamPhase};

/// Supplies the system context for a send.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// `None` when no context is available; the request then carries history only.
    async fn context_prompt(&self, language: &str) -> Option<String>;
}
