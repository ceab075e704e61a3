//! Host-environment services the resolver depends on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::api::RestWorkItemClient;
use crate::error::{Error, Result};

/// What the embedding host knows about the active work item.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// Id of the item the user is looking at, if any.
    async fn current_item_id(&self) -> Result<Option<u64>>;

    /// Reduced-field lookup for the active item. Never returns relations.
    async fn get_fields(&self, names: &[&str]) -> Result<Map<String, Value>>;
}

/// Host used by the CLI and the HTTP server.
///
/// The active item comes from configuration and can be switched at runtime.
/// The form service is a relation-less `fields=` query against the REST API.
pub struct ConfiguredHost {
    current: RwLock<Option<u64>>,
    rest: Option<Arc<RestWorkItemClient>>,
}

impl ConfiguredHost {
    pub fn new(current: Option<u64>, rest: Option<Arc<RestWorkItemClient>>) -> Self {
        Self {
            current: RwLock::new(current),
            rest,
        }
    }

    pub async fn current(&self) -> Option<u64> {
        *self.current.read().await
    }

    /// Switch the active item.
    pub async fn set_current(&self, id: Option<u64>) {
        *self.current.write().await = id;
    }
}

#[async_trait]
impl HostEnvironment for ConfiguredHost {
    async fn current_item_id(&self) -> Result<Option<u64>> {
        Ok(self.current().await)
    }

    async fn get_fields(&self, names: &[&str]) -> Result<Map<String, Value>> {
        let id = self
            .current_item_id()
            .await?
            .ok_or_else(|| Error::not_found("no active work item"))?;
        let rest = self
            .rest
            .as_ref()
            .ok_or_else(|| Error::config("work_tracking.base_url is not configured"))?;
        rest.fetch_fields(id, names).await
    }
}
