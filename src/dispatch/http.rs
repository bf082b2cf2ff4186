use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Shared JSON-over-HTTP transport for the provider handlers. Owns the
/// connection pool; status handling is common to every wire format.
#[derive(Clone)]
pub struct HttpDispatch {
    client: Client,
}

impl HttpDispatch {
    /// Build the client. Fails when the TLS backend cannot be initialized;
    /// the registry then leaves the provider unregistered.
    pub fn new() -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// POST `body` to `url` and decode the JSON response into `T`.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                provider: provider.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::AuthFailed {
                provider: provider.to_string(),
                message: format!("{status}"),
            });
        }

        // Cap error body reads to MAX_RESPONSE_BYTES to prevent memory exhaustion
        if !status.is_success() {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(MAX_RESPONSE_BYTES)];
            let text = String::from_utf8_lossy(truncated);
            return Err(ProviderError::Upstream {
                provider: provider.to_string(),
                message: format!("{status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ProviderError::Upstream {
            provider: provider.to_string(),
            message: format!("failed to read response body: {e}"),
            status: None,
        })?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(ProviderError::Upstream {
                provider: provider.to_string(),
                message: format!(
                    "response too large: {} bytes (max {})",
                    bytes.len(),
                    MAX_RESPONSE_BYTES
                ),
                status: None,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::SchemaParse(format!("failed to parse response: {e}")))
    }
}
