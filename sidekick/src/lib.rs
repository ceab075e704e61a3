//! Work-item aware assistant backend.
//!
//! A [`chat::StreamOrchestrator`] drives one LLM request at a time through an
//! [`llm::LlmTransport`], prepending a context prompt that
//! [`workitems::WorkItemContext`] builds from the active work item, its
//! parent and its children.

pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod server;
pub mod timeout;
pub mod workitems;

pub use error::{Error, Result};
