//! REST access to the work-tracking system.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::WorkItem;

const DEFAULT_API_VERSION: &str = "7.0";

/// Full-detail work item lookup.
#[async_trait]
pub trait WorkItemApi: Send + Sync {
    /// Fetch fields and relations for `id`.
    async fn fetch_work_item(&self, id: u64) -> Result<WorkItem>;
}

/// Supplies the credential attached to REST calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// `None` sends the request unauthenticated.
    async fn access_token(&self) -> Result<Option<String>>;
}

/// A token fixed at startup (configuration or environment).
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub const fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Stand-in used when no work-tracking URL is configured.
pub struct UnconfiguredApi;

#[async_trait]
impl WorkItemApi for UnconfiguredApi {
    async fn fetch_work_item(&self, id: u64) -> Result<WorkItem> {
        Err(Error::config(format!(
            "cannot fetch work item {id}: work_tracking.base_url is not configured"
        )))
    }
}

/// Shape of a `fields=`-only response.
#[derive(Debug, Deserialize)]
struct FieldsResponse {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// reqwest-backed client for `GET {base}/_apis/wit/workitems/{id}`.
pub struct RestWorkItemClient {
    client: Client,
    base_url: String,
    api_version: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl RestWorkItemClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: Option<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            tokens,
        }
    }

    /// URL for one work item. `expand_relations` adds `$expand=relations`.
    pub fn item_url(&self, id: u64, fields: &[&str], expand_relations: bool) -> String {
        let mut url = format!(
            "{}/_apis/wit/workitems/{id}?fields={}",
            self.base_url,
            urlencoding::encode(&fields.join(","))
        );
        if expand_relations {
            url.push_str("&$expand=relations");
        }
        url.push_str("&api-version=");
        url.push_str(&urlencoding::encode(&self.api_version));
        url
    }

    /// Relation-less lookup of selected fields.
    pub async fn fetch_fields(&self, id: u64, fields: &[&str]) -> Result<Map<String, Value>> {
        let body = self.get(id, &self.item_url(id, fields, false)).await?;
        let response: FieldsResponse = serde_json::from_str(&body)?;
        Ok(response.fields)
    }

    async fn get(&self, id: u64, url: &str) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(token) = self.tokens.access_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(format!("work item request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("work item response read failed: {e}")))?;

        if status == StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("work item {id}")));
        }
        if !status.is_success() {
            return Err(Error::transport(format!(
                "work item request failed with status {status}: {body}"
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl WorkItemApi for RestWorkItemClient {
    async fn fetch_work_item(&self, id: u64) -> Result<WorkItem> {
        let url = self.item_url(id, crate::models::field::FULL, true);
        let body = self.get(id, &url).await?;
        let item: WorkItem = serde_json::from_str(&body)?;
        Ok(item)
    }
}
