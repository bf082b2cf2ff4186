use std::path::PathBuf;

use thiserror::Error;

/// Dispatcher-level failures. `Display` is the exact message handed back to
/// the caller in `QueryResult::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no configuration found")]
    ConfigurationMissing,

    #[error("no provider specified")]
    ProviderUnspecified,

    #[error("unsupported provider: {0}")]
    ProviderUnsupported(String),

    #[error("no API key for provider {0}")]
    CredentialMissing(String),

    /// Wraps both a handler-reported error and a panic inside the handler.
    #[error("error: {0}")]
    ProviderCallFailed(String),
}

/// Failures raised by a provider handler while talking to its API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("http client unavailable: {0}")]
    Client(String),

    #[error("invalid settings for {provider}: {message}")]
    Settings { provider: String, message: String },
}

impl ProviderError {
    /// Sanitized message for the caller. Does not leak connection details or
    /// full upstream bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { provider } => {
                format!("rate limited by {provider}, try again shortly")
            }
            Self::AuthFailed { provider, message } => {
                format!("authentication failed for {provider}: {message}")
            }
            Self::Upstream {
                provider, message, ..
            } => {
                // Upstream bodies can be large HTML pages; keep the head.
                let preview: String = message.chars().take(300).collect();
                let suffix = if preview.len() < message.len() { "..." } else { "" };
                format!("upstream error from {provider}: {preview}{suffix}")
            }
            Self::SchemaParse(_) => "failed to parse provider response".to_string(),
            Self::Request(e) => {
                let kind = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else if e.is_decode() {
                    "response could not be decoded"
                } else if e.is_body() {
                    "response body could not be read"
                } else {
                    "failed"
                };
                format!("request to provider {kind}")
            }
            Self::Client(msg) => format!("http client unavailable: {msg}"),
            Self::Settings { provider, message } => {
                format!("invalid settings for {provider}: {message}")
            }
        }
    }
}

/// Notebook persistence failures. Always recovered inside the writer.
#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("log folder is not accessible: {0}")]
    FolderInaccessible(PathBuf),

    #[error("no notebook path could be resolved")]
    NoTarget,

    #[error("failed to save notebook {path}: {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration file failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
