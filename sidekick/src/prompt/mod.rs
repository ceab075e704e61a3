//! Prompt construction.

mod context;
mod html;

pub use context::{build_context_prompt, is_no_context, NO_CONTEXT_NOTICE, PARENT_SUMMARY_LIMIT};
pub use html::{strip_html, truncate_chars};
