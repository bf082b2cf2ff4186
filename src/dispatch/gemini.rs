use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::dispatch::anthropic::split_system;
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::registry::ProviderId;
use crate::dispatch::{HandlerConfig, ProviderHandler};
use crate::error::ProviderError;
use crate::message::{Message, Role};

/// Gemini `generateContent`. Assistant turns use the `model` role; system
/// turns become `systemInstruction`.
pub struct GeminiHandler {
    http: HttpDispatch,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiHandler {
    pub fn new(http: HttpDispatch) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderHandler for GeminiHandler {
    async fn query(
        &self,
        history: &[Message],
        config: &HandlerConfig,
    ) -> Result<String, ProviderError> {
        let settings = &config.settings;
        let base = settings
            .base_url
            .as_deref()
            .or(ProviderId::Gemini.default_base_url())
            .unwrap_or_default()
            .trim_end_matches('/');
        let model = settings
            .model
            .as_deref()
            .or(ProviderId::Gemini.default_model())
            .unwrap_or_default();
        let url = format!("{base}/{model}:generateContent");

        let (system, turns) = split_system(history);
        let contents: Vec<serde_json::Value> = turns
            .iter()
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        let mut generation = serde_json::Map::new();
        if let Some(t) = settings.temperature {
            generation.insert("temperature".to_string(), t.into());
        }
        if let Some(max) = settings.max_tokens {
            generation.insert("maxOutputTokens".to_string(), max.into());
        }
        if !generation.is_empty() {
            body["generationConfig"] = generation.into();
        }

        let headers = [("x-goog-api-key", config.api_key.clone())];
        let response: GenerateResponse = self
            .http
            .post_json(&config.provider, &url, &headers, &body)
            .await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Upstream {
                provider: config.provider.clone(),
                message: "no candidates or empty content".to_string(),
                status: None,
            });
        }
        Ok(text)
    }
}
