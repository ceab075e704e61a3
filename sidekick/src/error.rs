//! Error taxonomy shared by the context resolver, transports and orchestrator.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by sidekick operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation exceeded its deadline.
    #[error("{label} timed out after {}ms", elapsed.as_millis())]
    Timeout {
        /// Name of the guarded operation.
        label: String,
        /// How long the guard waited.
        elapsed: Duration,
    },

    /// Network or HTTP failure talking to the host or the LLM provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response body could not be decoded.
    #[error("malformed response: {0}")]
    Deserialization(String),

    /// The referenced work item (or resource) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// User-initiated abort. Not a failure.
    #[error("request cancelled")]
    Cancelled,

    /// Rejected caller input, such as an empty prompt.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller tried to mutate state that is owned by an in-flight request.
    #[error("a response is still streaming")]
    Busy,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation() {
        let err = Error::Timeout {
            label: "fetch work item 7".to_string(),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "fetch work item 7 timed out after 1500ms");
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn json_errors_are_deserialization_failures() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
