pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod registry;

use async_trait::async_trait;

use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::message::Message;

/// Per-call view handed to a handler. Built fresh by the dispatcher for each
/// query and dropped when the call returns; the key is never cached.
#[derive(Clone)]
pub struct HandlerConfig {
    pub provider: String,
    pub api_key: String,
    pub settings: ProviderSettings,
}

impl std::fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("settings", &self.settings)
            .finish()
    }
}

/// A single provider capability: run one chat-style query.
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    async fn query(
        &self,
        history: &[Message],
        config: &HandlerConfig,
    ) -> Result<String, ProviderError>;
}
