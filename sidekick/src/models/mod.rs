//! Data models for conversations and work items.

mod message;
mod relation;
mod work_item;

pub use message::{Message, MessageKind, MessageRole};
pub use relation::{target_id_from_url, Relation, RelationKind};
pub use work_item::{field, WorkItem, WorkItemSource};
