//! Read-through cache for REST-fetched work items.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::models::WorkItem;

struct CacheEntry {
    item: WorkItem,
    stored_at: Instant,
}

/// Work items keyed by id.
///
/// Constructed once per session and shared by reference with the resolver.
/// Without a TTL entries live until the cache is dropped. Concurrent misses
/// for the same id may both write; the later write wins.
pub struct WorkItemCache {
    entries: RwLock<HashMap<u64, CacheEntry>>,
    ttl: Option<Duration>,
}

impl WorkItemCache {
    /// A cache whose entries never expire.
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached snapshot for `id`, unless absent or expired.
    pub async fn get(&self, id: u64) -> Option<WorkItem> {
        let entries = self.entries.read().await;
        let entry = entries.get(&id)?;
        if let Some(ttl) = self.ttl {
            if entry.stored_at.elapsed() >= ttl {
                return None;
            }
        }
        Some(entry.item.clone())
    }

    pub async fn insert(&self, item: WorkItem) {
        let entry = CacheEntry {
            item,
            stored_at: Instant::now(),
        };
        self.entries.write().await.insert(entry.item.id, entry);
    }

    /// Drop one entry so the next lookup goes to the network.
    pub async fn invalidate(&self, id: u64) -> bool {
        self.entries.write().await.remove(&id).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for WorkItemCache {
    fn default() -> Self {
        Self::new()
    }
}
