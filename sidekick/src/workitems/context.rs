//! Resolver plus prompt builder: the context handed to each chat send.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::resolver::ContextResolver;
use crate::chat::ContextSource;
use crate::models::WorkItem;
use crate::prompt::{build_context_prompt, is_no_context};

/// A resolved hierarchy around the active item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkItemHierarchy {
    pub current: Option<WorkItem>,
    pub parent: Option<WorkItem>,
    pub children: Vec<WorkItem>,
}

impl WorkItemHierarchy {
    pub fn prompt(&self, language: &str) -> String {
        build_context_prompt(self.current.as_ref(), self.parent.as_ref(), &self.children, language)
    }
}

/// Loads the current item's hierarchy on demand.
pub struct WorkItemContext {
    resolver: Arc<ContextResolver>,
}

impl WorkItemContext {
    pub const fn new(resolver: Arc<ContextResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<ContextResolver> {
        &self.resolver
    }

    /// Current item, then parent and children concurrently.
    pub async fn load(&self) -> WorkItemHierarchy {
        let Some(current) = self.resolver.current_work_item().await else {
            return WorkItemHierarchy::default();
        };
        let (parent, children) = tokio::join!(
            self.resolver.parent_work_item(&current),
            self.resolver.child_work_items(&current),
        );
        tracing::debug!(
            work_item_id = current.id,
            has_parent = parent.is_some(),
            children = children.len(),
            "work item context loaded"
        );
        WorkItemHierarchy {
            current: Some(current),
            parent,
            children,
        }
    }
}

#[async_trait]
impl ContextSource for WorkItemContext {
    async fn context_prompt(&self, language: &str) -> Option<String> {
        let prompt = self.load().await.prompt(language);
        (!is_no_context(&prompt)).then_some(prompt)
    }
}
