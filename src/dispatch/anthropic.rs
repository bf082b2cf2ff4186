use async_trait::async_trait;
use serde::Deserialize;

use crate::dispatch::http::HttpDispatch;
use crate::dispatch::registry::ProviderId;
use crate::dispatch::{HandlerConfig, ProviderHandler};
use crate::error::ProviderError;
use crate::message::{Message, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API. System turns are hoisted into the top-level
/// `system` field; the remaining turns keep their order.
pub struct AnthropicHandler {
    http: HttpDispatch,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

impl AnthropicHandler {
    pub fn new(http: HttpDispatch) -> Self {
        Self { http }
    }
}

/// Split history into the joined system prompt and the conversational turns.
pub fn split_system(history: &[Message]) -> (Option<String>, Vec<&Message>) {
    let system: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns = history.iter().filter(|m| m.role != Role::System).collect();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, turns)
}

#[async_trait]
impl ProviderHandler for AnthropicHandler {
    async fn query(
        &self,
        history: &[Message],
        config: &HandlerConfig,
    ) -> Result<String, ProviderError> {
        let settings = &config.settings;
        let url = settings
            .base_url
            .as_deref()
            .or(ProviderId::Anthropic.default_base_url())
            .unwrap_or_default();

        let (system, turns) = split_system(history);
        let mut body = serde_json::json!({
            "model": settings.model.as_deref().or(ProviderId::Anthropic.default_model()),
            "max_tokens": settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": turns,
        });
        if let Some(system) = system {
            body["system"] = system.into();
        }
        if let Some(t) = settings.temperature {
            body["temperature"] = t.into();
        }

        let headers = [
            ("x-api-key", config.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];

        let response: MessagesResponse = self
            .http
            .post_json(&config.provider, url, &headers, &body)
            .await?;

        let text: Vec<String> = response
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect();

        if text.is_empty() {
            return Err(ProviderError::Upstream {
                provider: config.provider.clone(),
                message: "no text content in response".to_string(),
                status: None,
            });
        }
        Ok(text.join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_are_hoisted_in_order() {
        let history = vec![
            Message::new(Role::System, "be brief"),
            Message::new(Role::User, "hi"),
            Message::new(Role::System, "answer in French"),
            Message::new(Role::Assistant, "bonjour"),
        ];
        let (system, turns) = split_system(&history);
        assert_eq!(system.as_deref(), Some("be brief\n\nanswer in French"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn no_system_turns() {
        let history = vec![Message::new(Role::User, "hi")];
        let (system, turns) = split_system(&history);
        assert!(system.is_none());
        assert_eq!(turns.len(), 1);
    }
}
