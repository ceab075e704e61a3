//! Work item hierarchy resolution.
//!
//! Every public operation degrades instead of failing: errors are logged
//! where they happen and surface as `None`, an empty list, or a
//! lower-fidelity snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::api::WorkItemApi;
use super::cache::WorkItemCache;
use super::host::HostEnvironment;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{field, RelationKind, WorkItem, WorkItemSource};
use crate::timeout::{with_timeout, DEFAULT_FALLBACK_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Maximum ids resolved by one batch lookup unless configured otherwise.
pub const DEFAULT_BATCH_LIMIT: usize = 25;

/// Deadlines and limits for the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Deadline for each REST call.
    pub request_timeout: Duration,
    /// Deadline for host lookups on the fallback path.
    pub fallback_timeout: Duration,
    pub batch_limit: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl From<&AppConfig> for ResolverOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            fallback_timeout: config.fallback_timeout(),
            batch_limit: config.context.batch_limit,
        }
    }
}

/// Fetches work items REST-first, with host fallbacks and a shared cache.
pub struct ContextResolver {
    host: Arc<dyn HostEnvironment>,
    api: Arc<dyn WorkItemApi>,
    cache: Arc<WorkItemCache>,
    options: ResolverOptions,
}

impl ContextResolver {
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        api: Arc<dyn WorkItemApi>,
        cache: Arc<WorkItemCache>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            host,
            api,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<WorkItemCache> {
        &self.cache
    }

    /// The item the host considers active.
    ///
    /// Returns `None` only when the host cannot name an item. Otherwise the
    /// chain is: full REST fetch, reduced form fields, minimal form fields,
    /// placeholder.
    pub async fn current_work_item(&self) -> Option<WorkItem> {
        let id = match with_timeout(
            "current work item id",
            self.options.fallback_timeout,
            self.host.current_item_id(),
        )
        .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::debug!("host has no active work item");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "host could not supply the active work item id");
                return None;
            }
        };

        match self.fetch(id).await {
            Ok(item) => return Some(item),
            Err(e) => {
                tracing::warn!(work_item_id = id, error = %e, "REST fetch failed, falling back to form fields");
            }
        }

        match self.form_fields(id, field::REDUCED, WorkItemSource::FormService).await {
            Ok(item) => return Some(item),
            Err(e) => {
                tracing::warn!(work_item_id = id, error = %e, "reduced form fields failed, trying minimal set");
            }
        }

        match self.form_fields(id, field::MINIMAL, WorkItemSource::MinimalFields).await {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(work_item_id = id, error = %e, "minimal form fields failed, using placeholder");
                Some(WorkItem::placeholder(id))
            }
        }
    }

    /// The parent named by the first parent-kind relation of `item`.
    pub async fn parent_work_item(&self, item: &WorkItem) -> Option<WorkItem> {
        let relation = item.relations_of(RelationKind::Parent).next()?;
        let Some(id) = relation.target_id() else {
            tracing::debug!(work_item_id = item.id, url = %relation.url, "parent relation has no numeric id");
            return None;
        };

        match self.fetch(id).await {
            Ok(parent) => Some(parent),
            Err(e) => {
                tracing::warn!(work_item_id = item.id, parent_id = id, error = %e, "parent fetch failed");
                None
            }
        }
    }

    /// Children of `item` in relation order. Failed fetches are dropped.
    pub async fn child_work_items(&self, item: &WorkItem) -> Vec<WorkItem> {
        let ids: Vec<u64> = item
            .relations_of(RelationKind::Child)
            .filter_map(|r| r.target_id())
            .collect();
        let children = self.fetch_all(&ids).await;
        if children.len() < ids.len() {
            tracing::debug!(
                work_item_id = item.id,
                requested = ids.len(),
                resolved = children.len(),
                "some child work items could not be fetched"
            );
        }
        children
    }

    /// Batch lookup, capped at the configured limit.
    pub async fn work_items_by_ids(&self, ids: &[u64]) -> Vec<WorkItem> {
        let limit = self.options.batch_limit;
        let ids = if ids.len() > limit {
            tracing::warn!(requested = ids.len(), limit, "work item batch truncated");
            &ids[..limit]
        } else {
            ids
        };
        self.fetch_all(ids).await
    }

    /// REST fetch through the cache. A hit never touches the network.
    pub async fn fetch(&self, id: u64) -> Result<WorkItem> {
        if let Some(item) = self.cache.get(id).await {
            tracing::trace!(work_item_id = id, "work item cache hit");
            return Ok(item);
        }

        let label = format!("fetch work item {id}");
        let mut item = with_timeout(label, self.options.request_timeout, self.api.fetch_work_item(id)).await?;
        item.source = WorkItemSource::Rest;
        self.cache.insert(item.clone()).await;
        Ok(item)
    }

    async fn fetch_all(&self, ids: &[u64]) -> Vec<WorkItem> {
        let results = join_all(ids.iter().map(|&id| self.fetch(id))).await;
        ids.iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::debug!(work_item_id = id, error = %e, "dropping unresolved work item");
                    None
                }
            })
            .collect()
    }

    async fn form_fields(&self, id: u64, names: &[&str], source: WorkItemSource) -> Result<WorkItem> {
        let label = format!("form fields for work item {id}");
        let fields = with_timeout(label, self.options.fallback_timeout, self.host.get_fields(names)).await?;
        if fields.is_empty() {
            return Err(Error::not_found(format!("form service returned no fields for {id}")));
        }
        let item = WorkItem::from_fields(id, fields, source);
        if item.title().is_some() {
            return Ok(item);
        }
        Ok(item.with_field(field::TITLE, format!("Work Item {id}")))
    }
}
