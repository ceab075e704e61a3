//! OpenAI Chat Completions, including Azure OpenAI deployments.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::sse::{drain, ensure_success};
use super::{ChatRequest, ChunkSink, LlmTransport};
use crate::config::LlmConfig;
use crate::error::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_API_VERSION: &str = "2024-06-01";

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    ApiKey(String),
    None,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Chat Completions client.
pub struct OpenAiTransport {
    client: Client,
    url: String,
    auth: Auth,
    /// Sent in the body for OpenAI; Azure selects the model by deployment.
    model: Option<String>,
    temperature: Option<f32>,
}

impl OpenAiTransport {
    /// Public OpenAI or any compatible endpoint.
    ///
    /// A key is required unless a custom endpoint is configured.
    pub fn openai(config: &LlmConfig) -> Result<Self> {
        let endpoint = config.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let auth = match (&config.api_key, endpoint) {
            (Some(key), _) => Auth::Bearer(key.clone()),
            (None, Some(_)) => Auth::None,
            (None, None) => return Err(Error::config("llm.api_key is required for openai")),
        };
        let base = endpoint.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client: Client::new(),
            url: format!("{base}/chat/completions"),
            auth,
            model: Some(config.model.clone()),
            temperature: config.temperature,
        })
    }

    /// Azure OpenAI: `{endpoint}/openai/deployments/{deployment}/chat/completions`.
    pub fn azure(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::config("llm.endpoint is required for azure_openai"))?;
        let deployment = config
            .deployment
            .as_deref()
            .ok_or_else(|| Error::config("llm.deployment is required for azure_openai"))?;
        let key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::config("llm.api_key is required for azure_openai"))?;
        let version = config.api_version.as_deref().unwrap_or(AZURE_API_VERSION);

        Ok(Self {
            client: Client::new(),
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                urlencoding::encode(deployment),
                urlencoding::encode(version)
            ),
            auth: Auth::ApiKey(key),
            model: None,
            temperature: config.temperature,
        })
    }

    fn body(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .wire_messages()
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let mut body = serde_json::json!({ "messages": messages, "stream": stream });
        if let Some(model) = &self.model {
            body["model"] = serde_json::json!(model);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    fn post(&self, body: &Value) -> RequestBuilder {
        let request = self.client.post(&self.url).json(body);
        match &self.auth {
            Auth::Bearer(key) => request.bearer_auth(key),
            Auth::ApiKey(key) => request.header("api-key", key),
            Auth::None => request,
        }
    }
}

fn delta_text(payload: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content))
}

#[async_trait]
impl LlmTransport for OpenAiTransport {
    fn name(&self) -> &'static str {
        if matches!(self.auth, Auth::ApiKey(_)) {
            "azure_openai"
        } else {
            "openai"
        }
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        sink: ChunkSink,
        cancel: CancellationToken,
    ) -> Result<String> {
        let body = self.body(request, true);
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.post(&body).send() => response?,
        };
        let response = ensure_success(self.name(), response).await?;
        drain(response, &sink, &cancel, delta_text).await
    }

    async fn send_and_await(&self, request: &ChatRequest) -> Result<String> {
        let body = self.body(request, false);
        let response = ensure_success(self.name(), self.post(&body).send().await?).await?;
        let completion: Completion = serde_json::from_str(&response.text().await?)?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::deserialization("completion has no message content"))
    }
}
