//! Wiring from [`AppConfig`] to running components.

use std::sync::Arc;

use crate::chat::{ContextSource, OrchestratorOptions, StreamOrchestrator};
use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{build_transport, LlmTransport};
use crate::workitems::{
    AccessTokenProvider, ConfiguredHost, ContextResolver, ResolverOptions, RestWorkItemClient,
    StaticToken, UnconfiguredApi, WorkItemApi, WorkItemCache, WorkItemContext, WorkItemHierarchy,
};

/// Everything needed to resolve work item context. No LLM required.
pub struct ContextServices {
    pub host: Arc<ConfiguredHost>,
    pub context: Arc<WorkItemContext>,
}

impl ContextServices {
    pub fn from_config(config: &AppConfig) -> Self {
        let tracking = &config.work_tracking;
        let tokens: Arc<dyn AccessTokenProvider> =
            Arc::new(StaticToken::new(tracking.access_token.clone()));
        let rest = tracking.base_url.as_ref().map(|url| {
            Arc::new(RestWorkItemClient::new(
                url.clone(),
                tracking.api_version.clone(),
                tokens,
            ))
        });
        let api: Arc<dyn WorkItemApi> = match &rest {
            Some(rest) => rest.clone(),
            None => {
                tracing::debug!("work tracking not configured, context will be degraded");
                Arc::new(UnconfiguredApi)
            }
        };

        let host = Arc::new(ConfiguredHost::new(tracking.current_item_id, rest));
        let resolver = ContextResolver::new(
            host.clone(),
            api,
            Arc::new(WorkItemCache::with_ttl(config.cache_ttl())),
            ResolverOptions::from(config),
        );
        Self {
            host,
            context: Arc::new(WorkItemContext::new(Arc::new(resolver))),
        }
    }

    /// Make `id` the active item and load it, bypassing any cached copy.
    pub async fn switch_work_item(&self, id: u64) -> WorkItemHierarchy {
        self.host.set_current(Some(id)).await;
        self.context.resolver().cache().invalidate(id).await;
        self.context.load().await
    }
}

/// The assistant backend: context services plus the orchestrator.
pub struct Sidekick {
    pub config: AppConfig,
    pub services: ContextServices,
    pub orchestrator: StreamOrchestrator,
}

impl Sidekick {
    /// Build with the transport named by `config.llm`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let transport = build_transport(&config.llm)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: AppConfig, transport: Arc<dyn LlmTransport>) -> Self {
        let services = ContextServices::from_config(&config);
        let context: Arc<dyn ContextSource> = services.context.clone();
        let orchestrator = StreamOrchestrator::new(
            transport,
            Some(context),
            OrchestratorOptions::from(&config.chat),
        );
        Self {
            config,
            services,
            orchestrator,
        }
    }

    /// Switch the active item and note it in the conversation log.
    pub async fn switch_work_item(&self, id: u64) -> WorkItemHierarchy {
        let hierarchy = self.services.switch_work_item(id).await;
        let label = hierarchy
            .current
            .as_ref()
            .and_then(crate::models::WorkItem::title)
            .map_or_else(|| format!("#{id}"), |title| format!("#{id} ({title})"));
        self.orchestrator.notice(format!("Context loaded for {label}")).await;
        hierarchy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, WorkItemSource};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-test".to_string());
        config
    }

    #[tokio::test]
    async fn unconfigured_tracking_degrades_to_placeholder() {
        let app = Sidekick::from_config(config()).unwrap();

        let hierarchy = app.switch_work_item(5).await;
        let current = hierarchy.current.unwrap();
        assert_eq!(current.source, WorkItemSource::Placeholder);
        assert!(hierarchy.parent.is_none());

        let log = app.orchestrator.snapshot().await.messages;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, MessageKind::Notice);
        assert_eq!(log[0].content, "Context loaded for #5 (Work Item 5)");
        assert!(app.orchestrator.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn no_active_item_means_no_context() {
        let services = ContextServices::from_config(&AppConfig::default());
        assert!(services.context.context_prompt("English").await.is_none());
    }

    #[test]
    fn missing_llm_key_fails_to_build() {
        assert!(Sidekick::from_config(AppConfig::default()).is_err());
    }
}
