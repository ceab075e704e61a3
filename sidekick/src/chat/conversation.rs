//! Message log and model-facing history.

use serde::Serialize;
use uuid::Uuid;

use crate::llm::{ChatMessage, ChatRequest};
use crate::models::{Message, MessageKind, MessageRole};

/// Both views of a conversation.
///
/// `log` is what presentation renders: chat turns, in-flight placeholders,
/// error replies and notices. `history` holds only completed user/assistant
/// exchanges and is what the model sees on the next send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    log: Vec<Message>,
    history: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[Message] {
        &self.log
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn message_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.log.iter_mut().find(|m| m.id == id)
    }

    /// Append to the log only.
    pub fn push_log(&mut self, message: Message) -> &Message {
        self.log.push(message);
        &self.log[self.log.len() - 1]
    }

    /// Record a finished exchange.
    pub fn push_exchange(&mut self, user: Message, assistant: Message) {
        debug_assert_eq!(user.role, MessageRole::User);
        debug_assert_eq!(assistant.role, MessageRole::Assistant);
        self.history.push(user);
        self.history.push(assistant);
    }

    /// Number of messages currently flagged as streaming.
    pub fn streaming_count(&self) -> usize {
        self.log.iter().filter(|m| m.streaming).count()
    }

    /// Request for a new prompt: context first, then history, then the prompt.
    ///
    /// System messages in history are skipped; context is always supplied
    /// fresh by the caller.
    pub fn request_for(&self, context: Option<&str>, prompt: &str, language: &str) -> ChatRequest {
        let mut request = ChatRequest::new(language);
        if let Some(context) = context {
            request.push(MessageRole::System, context);
        }
        request.messages.extend(
            self.history
                .iter()
                .filter(|m| m.role != MessageRole::System && m.kind == MessageKind::Chat)
                .map(ChatMessage::from),
        );
        request.push(MessageRole::User, prompt);
        request
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.history.clear();
    }
}
