//! LLM transports.
//!
//! A transport turns a [`ChatRequest`] into text, either incrementally through
//! a [`ChunkSink`] or in one piece. Providers differ only in URL, headers and
//! JSON shape; framing and cancellation live in [`sse`].

mod gemini;
mod openai;
pub mod sse;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{LlmConfig, ProviderKind};
use crate::error::Result;
use crate::models::{Message, MessageRole};

pub use gemini::GeminiTransport;
pub use openai::OpenAiTransport;

/// One entry of the history sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// Ordered history plus the language answers should be written in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub language: String,
}

impl ChatRequest {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            language: language.into(),
        }
    }

    pub fn push(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    /// Messages as sent on the wire.
    ///
    /// Without a leading system message, a short language instruction is
    /// added so the answer language holds even when no context was loaded.
    pub fn wire_messages(&self) -> Vec<ChatMessage> {
        let has_system = self
            .messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System);
        let language = self.language.trim();
        if has_system || language.is_empty() {
            return self.messages.clone();
        }
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ChatMessage::new(
            MessageRole::System,
            format!("Always respond in {language}."),
        ));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// Receives incremental text from a streaming transport.
#[derive(Clone)]
pub struct ChunkSink(Arc<dyn Fn(String) + Send + Sync>);

impl ChunkSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn push(&self, text: impl Into<String>) {
        (self.0)(text.into());
    }
}

impl fmt::Debug for ChunkSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkSink")
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stream the answer into `sink` and return the full text.
    ///
    /// Returns [`crate::Error::Cancelled`] once `cancel` fires; chunks already
    /// pushed stay pushed.
    async fn stream(
        &self,
        request: &ChatRequest,
        sink: ChunkSink,
        cancel: CancellationToken,
    ) -> Result<String>;

    /// Non-streaming request returning the complete answer.
    async fn send_and_await(&self, request: &ChatRequest) -> Result<String>;
}

/// Transport for the configured provider.
pub fn build_transport(config: &LlmConfig) -> Result<Arc<dyn LlmTransport>> {
    let transport: Arc<dyn LlmTransport> = match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiTransport::openai(config)?),
        ProviderKind::AzureOpenAi => Arc::new(OpenAiTransport::azure(config)?),
        ProviderKind::Gemini => Arc::new(GeminiTransport::new(config)?),
    };
    tracing::debug!(provider = transport.name(), model = %config.model, "llm transport ready");
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[test]
    fn language_instruction_added_without_system_message() {
        let mut request = ChatRequest::new("French");
        request.push(MessageRole::User, "hi");
        let wire = request.wire_messages();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0], ChatMessage::new(MessageRole::System, "Always respond in French."));

        let mut with_context = ChatRequest::new("French");
        with_context.push(MessageRole::System, "context");
        with_context.push(MessageRole::User, "hi");
        assert_eq!(with_context.wire_messages(), with_context.messages);
    }

    #[test]
    fn sink_forwards_pushes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ChunkSink::new(move |t| seen.lock().unwrap().push(t))
        };
        sink.push("a");
        sink.clone().push("b");
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn build_transport_checks_credentials() {
        let config = LlmConfig {
            provider: ProviderKind::Gemini,
            ..LlmConfig::default()
        };
        assert!(matches!(build_transport(&config), Err(Error::Config(_))));

        let config = LlmConfig {
            provider: ProviderKind::Gemini,
            api_key: Some("k".into()),
            model: "gemini-1.5-flash".into(),
            ..LlmConfig::default()
        };
        assert_eq!(build_transport(&config).unwrap().name(), "gemini");
    }
}
