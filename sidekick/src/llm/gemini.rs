//! Google Gemini `generateContent` API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::sse::{drain, ensure_success};
use super::{ChatRequest, ChunkSink, LlmTransport};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::models::MessageRole;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }
}

pub struct GeminiTransport {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl GeminiTransport {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::config("llm.api_key is required for gemini"))?;
        let base_url = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(GEMINI_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: Client::new(),
            base_url,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, urlencoding::encode(&self.model))
    }

    /// System messages become `systemInstruction`; assistant turns use role `model`.
    fn body(request: &ChatRequest, temperature: Option<f32>) -> Value {
        let messages = request.wire_messages();
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = if m.role == MessageRole::Assistant { "model" } else { "user" };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = serde_json::json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        if let Some(temperature) = temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": temperature });
        }
        body
    }

    fn post(&self, url: &str, body: &Value) -> RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
    }
}

fn chunk_text(payload: &str) -> Result<Option<String>> {
    let response: GenerateResponse = serde_json::from_str(payload)?;
    Ok(response.text())
}

#[async_trait]
impl LlmTransport for GeminiTransport {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        sink: ChunkSink,
        cancel: CancellationToken,
    ) -> Result<String> {
        let url = format!("{}?alt=sse", self.url("streamGenerateContent"));
        let body = Self::body(request, self.temperature);
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.post(&url, &body).send() => response?,
        };
        let response = ensure_success(self.name(), response).await?;
        drain(response, &sink, &cancel, chunk_text).await
    }

    async fn send_and_await(&self, request: &ChatRequest) -> Result<String> {
        let body = Self::body(request, self.temperature);
        let response = self.post(&self.url("generateContent"), &body).send().await?;
        let response = ensure_success(self.name(), response).await?;
        let parsed: GenerateResponse = serde_json::from_str(&response.text().await?)?;
        parsed
            .text()
            .ok_or_else(|| Error::deserialization("gemini response has no candidates"))
    }
}
