use std::any::Any;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Config, resolve_key};
use crate::dispatch::anthropic::AnthropicHandler;
use crate::dispatch::gemini::GeminiHandler;
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::openai::OpenAiCompatible;
use crate::dispatch::{HandlerConfig, ProviderHandler};
use crate::error::{DispatchError, ProviderError};
use crate::message::MessageHistory;
use crate::response::QueryResult;

/// Known provider identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    Anthropic,
    OpenAi,
    DeepSeek,
    Gemini,
    OpenRouter,
    Ollama,
    Mistral,
    Groq,
    AzureOpenAi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 9] = [
        Self::Anthropic,
        Self::OpenAi,
        Self::DeepSeek,
        Self::Gemini,
        Self::OpenRouter,
        Self::Ollama,
        Self::Mistral,
        Self::Groq,
        Self::AzureOpenAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
            Self::Mistral => "mistral",
            Self::Groq => "groq",
            Self::AzureOpenAi => "azure_openai",
        }
    }

    /// Endpoint used when the settings carry no `base_url`. Azure has none:
    /// the resource endpoint is always user-specific.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("https://api.anthropic.com/v1/messages"),
            Self::OpenAi => Some("https://api.openai.com/v1/chat/completions"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1/chat/completions"),
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/models"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1/chat/completions"),
            Self::Ollama => Some("http://localhost:11434/v1/chat/completions"),
            Self::Mistral => Some("https://api.mistral.ai/v1/chat/completions"),
            Self::Groq => Some("https://api.groq.com/openai/v1/chat/completions"),
            Self::AzureOpenAi => None,
        }
    }

    /// Model used when the settings carry no `model`. Azure addresses a
    /// deployment instead.
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("claude-3-5-sonnet-latest"),
            Self::OpenAi => Some("gpt-5-nano"),
            Self::DeepSeek => Some("deepseek-chat"),
            Self::Gemini => Some("gemini-1.5-flash"),
            Self::OpenRouter => Some("openai/gpt-4o-mini"),
            Self::Ollama => Some("llama3.1"),
            Self::Mistral => Some("mistral-small-latest"),
            Self::Groq => Some("llama-3.3-70b-versatile"),
            Self::AzureOpenAi => None,
        }
    }
}

impl FromStr for ProviderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider handlers keyed by identifier. A provider whose handler failed to
/// load is simply absent and reported as unsupported at dispatch time.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<ProviderId, Arc<dyn ProviderHandler>>,
    http: Option<HttpDispatch>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt every known provider once. Failures are logged, never fatal.
    pub fn with_known_providers() -> Self {
        let mut registry = Self::new();
        for id in ProviderId::ALL {
            registry.register_if_available(id);
        }
        tracing::info!(
            registered = registry.handlers.len(),
            "provider registry populated"
        );
        registry
    }

    /// Load the built-in handler for `id`. On failure the provider stays
    /// unregistered and a warning is logged.
    pub fn register_if_available(&mut self, id: ProviderId) {
        match self.load_handler(id) {
            Ok(handler) => {
                self.handlers.insert(id, handler);
            }
            Err(e) => {
                tracing::warn!(provider = %id, "provider handler unavailable: {e}");
            }
        }
    }

    /// Register (or replace) a handler explicitly.
    pub fn register(&mut self, id: ProviderId, handler: Arc<dyn ProviderHandler>) {
        self.handlers.insert(id, handler);
    }

    pub fn lookup(&self, provider: &str) -> Option<Arc<dyn ProviderHandler>> {
        let id = provider.parse::<ProviderId>().ok()?;
        self.handlers.get(&id).cloned()
    }

    /// Registered providers, sorted.
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.handlers.keys().copied().collect();
        ids.sort();
        ids
    }

    fn load_handler(&mut self, id: ProviderId) -> Result<Arc<dyn ProviderHandler>, ProviderError> {
        let http = self.http()?;
        let handler: Arc<dyn ProviderHandler> = match id {
            ProviderId::Anthropic => Arc::new(AnthropicHandler::new(http)),
            ProviderId::Gemini => Arc::new(GeminiHandler::new(http)),
            ProviderId::OpenAi
            | ProviderId::DeepSeek
            | ProviderId::OpenRouter
            | ProviderId::Ollama
            | ProviderId::Mistral
            | ProviderId::Groq
            | ProviderId::AzureOpenAi => Arc::new(OpenAiCompatible::new(http, id)),
        };
        Ok(handler)
    }

    /// Shared HTTP transport, built on first use.
    fn http(&mut self) -> Result<HttpDispatch, ProviderError> {
        if let Some(http) = &self.http {
            return Ok(http.clone());
        }
        let http = HttpDispatch::new()?;
        self.http = Some(http.clone());
        Ok(http)
    }

    /// Run one query against the configured provider. Never fails: every
    /// problem comes back as `QueryResult::error`.
    ///
    /// Must be polled inside a Tokio runtime; the handler runs as a spawned
    /// task. Without one the call reports an error instead of running.
    pub async fn dispatch(&self, config: Option<&Config>, history: &MessageHistory) -> QueryResult {
        self.try_dispatch(config, history).await.into()
    }

    /// Typed form of [`Registry::dispatch`]. Validation stops at the first
    /// failure; the handler runs at most once.
    ///
    /// The provider name is matched case-insensitively. Its settings are
    /// read from the canonical entry (`openai`) when present, else from the
    /// entry named exactly as configured.
    pub async fn try_dispatch(
        &self,
        config: Option<&Config>,
        history: &MessageHistory,
    ) -> Result<String, DispatchError> {
        let config = config.ok_or(DispatchError::ConfigurationMissing)?;
        let provider = config.provider().ok_or(DispatchError::ProviderUnspecified)?;
        let (id, handler) = provider
            .parse::<ProviderId>()
            .ok()
            .and_then(|id| Some((id, self.handlers.get(&id)?.clone())))
            .ok_or_else(|| DispatchError::ProviderUnsupported(provider.to_string()))?;

        let entry = if config.settings_for(id.as_str()).is_some() {
            id.as_str()
        } else {
            provider
        };
        let api_key = resolve_key(config, entry)
            .ok_or_else(|| DispatchError::CredentialMissing(provider.to_string()))?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            tracing::warn!(provider, "dispatch polled outside a tokio runtime: {e}");
            DispatchError::ProviderCallFailed("no async runtime available".to_string())
        })?;

        let handler_config = HandlerConfig {
            provider: id.as_str().to_string(),
            api_key,
            settings: config.settings_for(entry).cloned().unwrap_or_default(),
        };
        let messages = history.as_slice().to_vec();

        // Own task so a panic inside the handler surfaces as a JoinError
        // instead of unwinding through the caller.
        let task = runtime.spawn(async move { handler.query(&messages, &handler_config).await });

        match task.await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => {
                tracing::warn!(provider, "provider query failed: {e}");
                Err(DispatchError::ProviderCallFailed(e.user_message()))
            }
            Err(join_err) if join_err.is_panic() => {
                let details = panic_message(join_err.into_panic());
                tracing::warn!(provider, "provider handler panicked: {details}");
                Err(DispatchError::ProviderCallFailed(details))
            }
            Err(join_err) => {
                tracing::warn!(provider, "provider task cancelled: {join_err}");
                Err(DispatchError::ProviderCallFailed(join_err.to_string()))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ids_round_trip_through_strings() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>(), Ok(id));
        }
        assert_eq!(" OpenAI ".parse::<ProviderId>(), Ok(ProviderId::OpenAi));
        assert!("cohere".parse::<ProviderId>().is_err());
    }

    #[test]
    fn only_azure_lacks_defaults() {
        for id in ProviderId::ALL {
            let has_defaults = id.default_base_url().is_some() && id.default_model().is_some();
            assert_eq!(has_defaults, id != ProviderId::AzureOpenAi, "{id}");
        }
    }

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("kaboom".to_string())), "kaboom");
        assert_eq!(panic_message(Box::new(42u8)), "handler panicked");
    }
}
