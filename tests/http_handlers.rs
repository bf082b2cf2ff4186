//! Wire-format handlers against a local mock HTTP server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use marginalia::config::{Config, ProviderSettings};
use marginalia::dispatch::anthropic::AnthropicHandler;
use marginalia::dispatch::gemini::GeminiHandler;
use marginalia::dispatch::http::HttpDispatch;
use marginalia::dispatch::openai::OpenAiCompatible;
use marginalia::dispatch::registry::{ProviderId, Registry};
use marginalia::dispatch::{HandlerConfig, ProviderHandler};
use marginalia::error::ProviderError;
use marginalia::message::MessageHistory;

/// A captured HTTP request: lower-cased head plus the raw body.
struct Captured {
    head: String,
    body: serde_json::Value,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head
            .lines()
            .find(|l| l.starts_with(&prefix))
            .map(|l| l[prefix.len()..].trim())
    }
}

/// Serve exactly one request with `status` and `body`, returning what the
/// client sent.
async fn mock_server(status: &'static str, body: String) -> (u16, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut raw = Vec::new();
        let mut buf = vec![0u8; 8192];
        let head_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
        let content_length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        while raw.len() < head_end + content_length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }
        let request_body = serde_json::from_slice(&raw[head_end..]).unwrap_or_default();

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;

        Captured {
            head,
            body: request_body,
        }
    });

    (port, server)
}

fn handler_config(provider: &str, settings: ProviderSettings) -> HandlerConfig {
    HandlerConfig {
        provider: provider.to_string(),
        api_key: "sk-secret".to_string(),
        settings,
    }
}

fn settings(base_url: String) -> ProviderSettings {
    ProviderSettings {
        base_url: Some(base_url),
        ..ProviderSettings::default()
    }
}

fn conversation() -> MessageHistory {
    let mut history = MessageHistory::with_system("Be brief.");
    history.push_user("What is the capital of France?");
    history
}

fn openai_reply(content: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

#[tokio::test]
async fn openai_request_shape_and_answer() {
    let (port, server) = mock_server("200 OK", openai_reply("Paris.")).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::OpenAi);
    let mut s = settings(format!("http://127.0.0.1:{port}/v1/chat/completions"));
    s.temperature = Some(0.2);

    let answer = handler
        .query(conversation().as_slice(), &handler_config("openai", s))
        .await
        .unwrap();
    assert_eq!(answer, "Paris.");

    let req = server.await.unwrap();
    assert_eq!(req.request_line(), "post /v1/chat/completions http/1.1");
    assert_eq!(req.header("authorization"), Some("bearer sk-secret"));
    assert_eq!(req.body["model"], "gpt-5-nano");
    assert_eq!(req.body["temperature"], 0.2);
    assert!(req.body.get("max_tokens").is_none());
    assert_eq!(req.body["messages"][0]["role"], "system");
    assert_eq!(req.body["messages"][1]["role"], "user");
    assert_eq!(
        req.body["messages"][1]["content"],
        "What is the capital of France?"
    );
}

#[tokio::test]
async fn configured_model_overrides_default() {
    let (port, server) = mock_server("200 OK", openai_reply("ok")).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::Groq);
    let mut s = settings(format!("http://127.0.0.1:{port}/chat"));
    s.model = Some("llama-3.3-70b".to_string());
    s.max_tokens = Some(256);

    handler
        .query(conversation().as_slice(), &handler_config("groq", s))
        .await
        .unwrap();

    let req = server.await.unwrap();
    assert_eq!(req.body["model"], "llama-3.3-70b");
    assert_eq!(req.body["max_tokens"], 256);
}

#[tokio::test]
async fn azure_uses_deployment_url_and_api_key_header() {
    let (port, server) = mock_server("200 OK", openai_reply("Bonjour.")).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::AzureOpenAi);
    let mut s = settings(format!("http://127.0.0.1:{port}/"));
    s.model = Some("gpt4o-prod".to_string());

    let answer = handler
        .query(conversation().as_slice(), &handler_config("azure_openai", s))
        .await
        .unwrap();
    assert_eq!(answer, "Bonjour.");

    let req = server.await.unwrap();
    assert_eq!(
        req.request_line(),
        "post /openai/deployments/gpt4o-prod/chat/completions?api-version=2024-06-01 http/1.1"
    );
    assert_eq!(req.header("api-key"), Some("sk-secret"));
    assert!(req.header("authorization").is_none());
    assert!(req.body.get("model").is_none());
}

#[tokio::test]
async fn azure_without_endpoint_is_a_settings_error() {
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::AzureOpenAi);
    let err = handler
        .query(
            conversation().as_slice(),
            &handler_config("azure_openai", ProviderSettings::default()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Settings { .. }), "got {err:?}");
}

#[tokio::test]
async fn empty_choices_is_upstream_error() {
    let body = serde_json::json!({ "choices": [] }).to_string();
    let (port, _server) = mock_server("200 OK", body).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::OpenAi);

    let err = handler
        .query(
            conversation().as_slice(),
            &handler_config("openai", settings(format!("http://127.0.0.1:{port}/"))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Upstream { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthorized_maps_to_auth_failed() {
    let (port, _server) = mock_server("401 Unauthorized", "{}".to_string()).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::OpenAi);

    let err = handler
        .query(
            conversation().as_slice(),
            &handler_config("openai", settings(format!("http://127.0.0.1:{port}/"))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::AuthFailed { .. }), "got {err:?}");
    assert_eq!(
        err.user_message(),
        "authentication failed for openai: 401 Unauthorized"
    );
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let (port, _server) = mock_server("429 Too Many Requests", "{}".to_string()).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::DeepSeek);

    let err = handler
        .query(
            conversation().as_slice(),
            &handler_config("deepseek", settings(format!("http://127.0.0.1:{port}/"))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited { .. }), "got {err:?}");
    assert_eq!(err.user_message(), "rate limited by deepseek, try again shortly");
}

#[tokio::test]
async fn server_error_keeps_status_and_body_preview() {
    let (port, _server) = mock_server("503 Service Unavailable", "overloaded".to_string()).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::OpenAi);

    let err = handler
        .query(
            conversation().as_slice(),
            &handler_config("openai", settings(format!("http://127.0.0.1:{port}/"))),
        )
        .await
        .unwrap_err();
    match err {
        ProviderError::Upstream {
            status, message, ..
        } => {
            assert_eq!(status, Some(503));
            assert!(message.contains("overloaded"), "message: {message}");
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_is_schema_error() {
    let (port, _server) = mock_server("200 OK", "not json".to_string()).await;
    let handler = OpenAiCompatible::new(HttpDispatch::new().unwrap(), ProviderId::OpenAi);

    let err = handler
        .query(
            conversation().as_slice(),
            &handler_config("openai", settings(format!("http://127.0.0.1:{port}/"))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::SchemaParse(_)), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Anthropic and Gemini
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anthropic_lifts_system_and_joins_text_blocks() {
    let reply = serde_json::json!({
        "content": [
            { "type": "text", "text": "Paris" },
            { "type": "tool_use", "id": "x" },
            { "type": "text", "text": " is the capital." }
        ]
    })
    .to_string();
    let (port, server) = mock_server("200 OK", reply).await;
    let handler = AnthropicHandler::new(HttpDispatch::new().unwrap());

    let answer = handler
        .query(
            conversation().as_slice(),
            &handler_config("anthropic", settings(format!("http://127.0.0.1:{port}/v1/messages"))),
        )
        .await
        .unwrap();
    assert_eq!(answer, "Paris is the capital.");

    let req = server.await.unwrap();
    assert_eq!(req.header("x-api-key"), Some("sk-secret"));
    assert_eq!(req.header("anthropic-version"), Some("2023-06-01"));
    assert_eq!(req.body["system"], "Be brief.");
    assert_eq!(req.body["max_tokens"], 4096);
    let messages = req.body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[tokio::test]
async fn gemini_maps_roles_and_reads_candidate_parts() {
    let reply = serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": "Par" }, { "text": "is." }] }
        }]
    })
    .to_string();
    let (port, server) = mock_server("200 OK", reply).await;
    let handler = GeminiHandler::new(HttpDispatch::new().unwrap());

    let mut history = conversation();
    history.push_assistant("Earlier answer.");
    history.push_user("And Germany?");
    let mut s = settings(format!("http://127.0.0.1:{port}/v1beta/models"));
    s.model = Some("gemini-2.0-flash".to_string());

    let answer = handler
        .query(history.as_slice(), &handler_config("gemini", s))
        .await
        .unwrap();
    assert_eq!(answer, "Paris.");

    let req = server.await.unwrap();
    assert_eq!(
        req.request_line(),
        "post /v1beta/models/gemini-2.0-flash:generatecontent http/1.1"
    );
    assert_eq!(req.header("x-goog-api-key"), Some("sk-secret"));
    assert_eq!(req.body["systemInstruction"]["parts"][0]["text"], "Be brief.");
    let contents = req.body["contents"].as_array().unwrap();
    let roles: Vec<&str> = contents.iter().map(|c| c["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["user", "model", "user"]);
}

// ---------------------------------------------------------------------------
// End to end through the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registry_round_trip_against_mock_openai() {
    let (port, server) = mock_server("200 OK", openai_reply("Paris is the capital.")).await;
    let config = Config::from_toml_str(&format!(
        r#"
        provider = "openai"
        [provider_settings.openai]
        api_key = "sk-secret"
        base_url = "http://127.0.0.1:{port}/v1/chat/completions"
        "#
    ))
    .unwrap();

    let registry = Registry::with_known_providers();
    let result = registry.dispatch(Some(&config), &conversation()).await;
    assert_eq!(
        result.into_parts(),
        ("Paris is the capital.".to_string(), None)
    );
    server.await.unwrap();
}

#[tokio::test]
async fn registry_reports_auth_failure_as_error_result() {
    let (port, _server) = mock_server("403 Forbidden", "{}".to_string()).await;
    let config = Config::from_toml_str(&format!(
        r#"
        provider = "mistral"
        [provider_settings.mistral]
        api_key = "bad"
        base_url = "http://127.0.0.1:{port}/"
        "#
    ))
    .unwrap();

    let result = Registry::with_known_providers()
        .dispatch(Some(&config), &conversation())
        .await;
    assert_eq!(result.answer, "");
    let error = result.error.unwrap();
    assert!(error.starts_with("error: authentication failed for mistral"), "{error}");
    assert!(!error.contains("bad"), "key leaked: {error}");
}

#[tokio::test]
async fn refused_connection_names_the_failure_without_the_url() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config::from_toml_str(&format!(
        r#"
        provider = "openai"
        [provider_settings.openai]
        api_key = "sk-secret"
        base_url = "http://127.0.0.1:{port}/v1/chat/completions"
        "#
    ))
    .unwrap();

    let result = Registry::with_known_providers()
        .dispatch(Some(&config), &conversation())
        .await;
    assert_eq!(
        result.into_parts(),
        (
            String::new(),
            Some("error: request to provider connection failed".to_string())
        )
    );
}
