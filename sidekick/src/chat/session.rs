//! One in-flight request.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::Message;

/// Monotonic per-orchestrator session identity.
pub type SessionId = u64;

/// Where a send currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    #[default]
    Idle,
    /// History assembled, waiting for the first chunk.
    Sending,
    /// At least one chunk applied.
    Streaming,
}

impl StreamPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
        }
    }
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Errored,
    Aborted,
    /// No terminal result arrived before the inactivity deadline.
    WatchdogExpired,
}

impl SessionOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Aborted => "aborted",
            Self::WatchdogExpired => "watchdog_expired",
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State owned by the orchestrator for the active send.
#[derive(Debug)]
pub(crate) struct StreamSession {
    pub id: SessionId,
    /// Assistant message receiving the answer.
    pub message_id: Uuid,
    /// User turn that started the session; enters history on completion.
    pub user_message: Message,
    pub phase: StreamPhase,
    /// Text received so far.
    pub buffer: String,
    pub cancel: CancellationToken,
    pub started_at: Instant,
    done: Option<oneshot::Sender<SessionOutcome>>,
}

impl StreamSession {
    pub fn new(
        id: SessionId,
        message_id: Uuid,
        user_message: Message,
        done: oneshot::Sender<SessionOutcome>,
    ) -> Self {
        Self {
            id,
            message_id,
            user_message,
            phase: StreamPhase::Sending,
            buffer: String::new(),
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
            done: Some(done),
        }
    }

    /// Wake whoever holds the ticket. Only the first call has an effect.
    pub fn resolve(&mut self, outcome: SessionOutcome) {
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

/// Handle returned by a send.
#[derive(Debug)]
pub struct SendTicket {
    pub session_id: SessionId,
    /// Assistant message that will carry the answer.
    pub message_id: Uuid,
    outcome: oneshot::Receiver<SessionOutcome>,
}

impl SendTicket {
    pub(crate) const fn new(
        session_id: SessionId,
        message_id: Uuid,
        outcome: oneshot::Receiver<SessionOutcome>,
    ) -> Self {
        Self {
            session_id,
            message_id,
            outcome,
        }
    }

    /// Wait for the terminal outcome.
    pub async fn finished(self) -> SessionOutcome {
        self.outcome.await.unwrap_or(SessionOutcome::Aborted)
    }
}
