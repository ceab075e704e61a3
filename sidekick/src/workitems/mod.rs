//! Work item retrieval: REST client, host services, cache and resolver.

pub mod api;
pub mod cache;
pub mod context;
pub mod host;
pub mod resolver;

pub use api::{AccessTokenProvider, RestWorkItemClient, StaticToken, UnconfiguredApi, WorkItemApi};
pub use cache::WorkItemCache;
pub use context::{WorkItemContext, WorkItemHierarchy};
pub use host::{ConfiguredHost, HostEnvironment};
pub use resolver::{ContextResolver, ResolverOptions, DEFAULT_BATCH_LIMIT};
