use async_trait::async_trait;
use serde::Deserialize;

use crate::dispatch::http::HttpDispatch;
use crate::dispatch::registry::ProviderId;
use crate::dispatch::{HandlerConfig, ProviderHandler};
use crate::error::ProviderError;
use crate::message::Message;

const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// OpenAI-style chat completions. Serves openai, deepseek, openrouter, groq,
/// mistral and ollama as-is; Azure differs in URL shape and auth header.
pub struct OpenAiCompatible {
    http: HttpDispatch,
    provider: ProviderId,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatible {
    pub fn new(http: HttpDispatch, provider: ProviderId) -> Self {
        Self { http, provider }
    }

    fn endpoint(&self, config: &HandlerConfig) -> Result<String, ProviderError> {
        let settings = &config.settings;
        if self.provider != ProviderId::AzureOpenAi {
            return Ok(settings
                .base_url
                .clone()
                .or_else(|| self.provider.default_base_url().map(str::to_string))
                .unwrap_or_default());
        }

        let endpoint = settings.base_url.as_deref().ok_or_else(|| ProviderError::Settings {
            provider: config.provider.clone(),
            message: "base_url (resource endpoint) is required".to_string(),
        })?;
        if endpoint.contains("/chat/completions") {
            return Ok(endpoint.to_string());
        }
        let deployment = settings.model.as_deref().ok_or_else(|| ProviderError::Settings {
            provider: config.provider.clone(),
            message: "model (deployment name) is required".to_string(),
        })?;
        let version = settings
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_AZURE_API_VERSION);
        Ok(format!(
            "{}/openai/deployments/{deployment}/chat/completions?api-version={version}",
            endpoint.trim_end_matches('/')
        ))
    }
}

#[async_trait]
impl ProviderHandler for OpenAiCompatible {
    async fn query(
        &self,
        history: &[Message],
        config: &HandlerConfig,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint(config)?;
        let settings = &config.settings;

        let mut body = serde_json::json!({ "messages": history });
        if self.provider != ProviderId::AzureOpenAi {
            body["model"] = settings
                .model
                .as_deref()
                .or(self.provider.default_model())
                .into();
        }
        if let Some(t) = settings.temperature {
            body["temperature"] = t.into();
        }
        if let Some(max) = settings.max_tokens {
            body["max_tokens"] = max.into();
        }

        let headers = if self.provider == ProviderId::AzureOpenAi {
            vec![("api-key", config.api_key.clone())]
        } else {
            vec![("Authorization", format!("Bearer {}", config.api_key))]
        };

        let completion: ChatCompletion = self
            .http
            .post_json(&config.provider, &url, &headers, &body)
            .await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Upstream {
                provider: config.provider.clone(),
                message: "empty choices or null content".to_string(),
                status: None,
            })
    }
}
