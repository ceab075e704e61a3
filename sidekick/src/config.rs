//! Application configuration.
//!
//! Loaded from `<config dir>/sidekick/config.toml` (or an explicit path) and
//! then overridden by `SIDEKICK_*` environment variables. A missing file is
//! not an error; every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_DIR: &str = "sidekick";
const CONFIG_FILE: &str = "config.toml";

/// Port the HTTP surface listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 58231;

/// Which LLM API family to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    AzureOpenAi,
    Gemini,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Gemini => "gemini",
        }
    }
}

/// How responses are surfaced to the conversation log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Chunks are appended to the in-flight message as they arrive.
    #[default]
    Streaming,
    /// A placeholder is shown until the full response replaces it.
    Buffered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    /// Base endpoint. Required for Azure; optional override otherwise.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Azure deployment name.
    pub deployment: Option<String>,
    /// Azure `api-version` query parameter.
    pub api_version: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            endpoint: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            deployment: None,
            api_version: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkTrackingConfig {
    /// Organization/project URL, e.g. `https://dev.azure.com/acme/shop`.
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub access_token: Option<String>,
    /// Item to use as conversation context.
    pub current_item_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub mode: DeliveryMode,
    /// Language the assistant is asked to answer in.
    pub language: String,
    pub watchdog_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Streaming,
            language: "English".to_string(),
            watchdog_secs: 30,
        }
    }
}

impl ChatConfig {
    pub const fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub request_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    pub batch_limit: usize,
    /// Absent means cached work items never expire.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            fallback_timeout_secs: 8,
            batch_limit: 25,
            cache_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub work_tracking: WorkTrackingConfig,
    pub chat: ChatConfig,
    pub context: ContextConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Default config file location.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| Error::config("could not locate config directory"))?;
        Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path` (or the default location) and apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; a missing or empty file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("invalid config at {}: {e}", path.display())))
    }

    /// Apply `SIDEKICK_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("SIDEKICK_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("SIDEKICK_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Some(model) = lookup("SIDEKICK_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(token) = lookup("SIDEKICK_WORK_TOKEN") {
            self.work_tracking.access_token = Some(token);
        }
        if let Some(url) = lookup("SIDEKICK_WORK_BASE_URL") {
            self.work_tracking.base_url = Some(url);
        }
        if let Some(id) = lookup("SIDEKICK_WORK_ITEM_ID") {
            match id.trim().parse() {
                Ok(id) => self.work_tracking.current_item_id = Some(id),
                Err(_) => tracing::warn!(value = %id, "ignoring non-numeric SIDEKICK_WORK_ITEM_ID"),
            }
        }
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.context.request_timeout_secs == 0 || self.context.fallback_timeout_secs == 0 {
            return Err(Error::config("context timeouts must be greater than zero"));
        }
        if self.context.batch_limit == 0 {
            return Err(Error::config("context.batch_limit must be greater than zero"));
        }
        if self.chat.watchdog_secs == 0 {
            return Err(Error::config("chat.watchdog_secs must be greater than zero"));
        }
        if self.llm.provider == ProviderKind::AzureOpenAi {
            if self.llm.endpoint.as_deref().is_none_or(|e| e.trim().is_empty()) {
                return Err(Error::config("llm.endpoint is required for azure_openai"));
            }
            if self.llm.deployment.is_none() {
                return Err(Error::config("llm.deployment is required for azure_openai"));
            }
        }
        Ok(())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.context.request_timeout_secs)
    }

    pub const fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.context.fallback_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.context.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.llm.api_key.is_some() {
            copy.llm.api_key = Some("********".to_string());
        }
        if copy.work_tracking.access_token.is_some() {
            copy.work_tracking.access_token = Some("********".to_string());
        }
        copy
    }
}
