use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Default cap on characters handed to a provider as context.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 100_000;

/// Default number of pages read back from the current page.
pub const DEFAULT_MAX_PAGE_WINDOW: u32 = 250;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MARGINALIA_CONFIG";

/// Config file used when `MARGINALIA_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "marginalia.toml";

const DEFAULT_RECAP_SYSTEM_PROMPT: &str = "You are a helpful reading companion. \
Summarize what the reader has read so far without revealing anything beyond it.";

const DEFAULT_RECAP_USER_PROMPT: &str = "I am returning to \"{title}\". \
Give me a short recap of the story so far based on the text below.";

/// Top-level configuration. Every level tolerates absent keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active provider identifier (e.g. "openai").
    pub provider: Option<String>,
    pub provider_settings: HashMap<String, ProviderSettings>,
    pub features: Features,
}

/// Per-provider settings. Only `api_key` is consulted by the dispatcher;
/// the rest is forwarded to the handler.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Azure OpenAI `api-version` query parameter.
    pub api_version: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Features {
    pub max_text_length_for_analysis: Option<usize>,
    pub max_page_size_for_analysis: Option<u32>,
    pub default_folder_for_logs: Option<PathBuf>,
    pub recap_config: Option<RecapConfig>,
    /// Locale code or language name the answers should be written in.
    pub response_language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecapConfig {
    pub system_prompt: Option<String>,
    /// Template; `{title}` is replaced with the book title.
    pub user_prompt: Option<String>,
}

impl RecapConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_RECAP_SYSTEM_PROMPT)
    }

    pub fn user_prompt(&self, title: &str) -> String {
        self.user_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_RECAP_USER_PROMPT)
            .replace("{title}", title)
    }
}

/// Limits applied by the context pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_text_length: usize,
    pub max_page_window: u32,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_page_window: DEFAULT_MAX_PAGE_WINDOW,
        }
    }
}

impl Config {
    /// Load the config file named by `MARGINALIA_CONFIG`, or `marginalia.toml`
    /// in the working directory. A missing or unparsable file yields `None`;
    /// callers treat that as "no configuration".
    pub fn load() -> Option<Self> {
        let path = env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file");
            return None;
        }

        match Self::load_from(&path) {
            Ok(mut config) => {
                config.apply_env_overrides(|name| env::var(name).ok());
                Some(config)
            }
            Err(e) => {
                tracing::warn!("ignoring config: {e}");
                None
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Fill absent `api_key`, `base_url` and `model` of every known provider
    /// from `<PREFIX>_API_KEY`, `<PREFIX>_BASE_URL` and `<PREFIX>_MODEL`.
    /// Values already present in the file win.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in crate::dispatch::registry::ProviderId::ALL {
            let prefix = id.as_str().to_uppercase();
            let read = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.trim().is_empty());

            let api_key = read("API_KEY");
            let base_url = read("BASE_URL");
            let model = read("MODEL");
            if api_key.is_none() && base_url.is_none() && model.is_none() {
                continue;
            }

            let settings = self
                .provider_settings
                .entry(id.as_str().to_string())
                .or_default();
            if settings.api_key.is_none() {
                settings.api_key = api_key;
            }
            if settings.base_url.is_none() {
                settings.base_url = base_url;
            }
            if settings.model.is_none() {
                settings.model = model;
            }
        }
    }

    /// The selected provider, if set to something non-blank.
    pub fn provider(&self) -> Option<&str> {
        self.provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn settings_for(&self, provider: &str) -> Option<&ProviderSettings> {
        self.provider_settings.get(provider)
    }

    pub fn max_text_length(&self) -> usize {
        self.features
            .max_text_length_for_analysis
            .unwrap_or(DEFAULT_MAX_TEXT_LENGTH)
    }

    pub fn max_page_window(&self) -> u32 {
        self.features
            .max_page_size_for_analysis
            .unwrap_or(DEFAULT_MAX_PAGE_WINDOW)
    }

    pub fn context_limits(&self) -> ContextLimits {
        ContextLimits {
            max_text_length: self.max_text_length(),
            max_page_window: self.max_page_window(),
        }
    }

    pub fn log_folder(&self) -> Option<&Path> {
        self.features
            .default_folder_for_logs
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn response_language(&self) -> Option<&str> {
        self.features
            .response_language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    pub fn recap(&self) -> RecapConfig {
        self.features.recap_config.clone().unwrap_or_default()
    }
}

/// Resolve the API key for `provider`. Blank keys count as absent.
/// Re-evaluated on every dispatch so edits between calls take effect.
pub fn resolve_key(config: &Config, provider: &str) -> Option<String> {
    config
        .settings_for(provider)?
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
