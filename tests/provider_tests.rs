//! AI provider tests against a local mock HTTP server.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use support_desk::config::{AiSettings, ProviderKind};
use support_desk::core::assistant::{ChatMessage, Role};
use support_desk::core::traits::{AiError, CompletionRequest};
use support_desk::infrastructure::providers::build_provider;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Seen {
    model: String,
    body: Value,
    headers: HeaderMap,
}

type Log = Arc<Mutex<Vec<Seen>>>;

/// `failing-model` answers 500, `empty-model` answers with empty content,
/// anything else echoes its model name.
async fn chat_completions(
    State(log): State<Log>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let model = body["model"].as_str().unwrap_or_default().to_owned();
    log.lock().await.push(Seen {
        model: model.clone(),
        body: body.clone(),
        headers,
    });

    match model.as_str() {
        "failing-model" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "boom"})),
        ),
        "empty-model" => (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"content": "  "}}]})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"content": format!("from {model}")}}]})),
        ),
    }
}

async fn ollama_chat(State(log): State<Log>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let model = body["model"].as_str().unwrap_or_default().to_owned();
    log.lock().await.push(Seen {
        model: model.clone(),
        body,
        headers,
    });
    Json(json!({"message": {"role": "assistant", "content": format!("local {model}")}, "done": true}))
}

async fn start_mock() -> (SocketAddr, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/api/chat", post(ollama_chat))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, log)
}

fn settings(provider: ProviderKind, addr: SocketAddr, model: &str) -> AiSettings {
    let mut settings = AiSettings::for_provider(provider);
    settings.model = model.to_owned();
    settings.api_key = Some("sk-test".to_owned());
    settings.base_url = match provider {
        ProviderKind::Ollama => format!("http://{addr}"),
        _ => format!("http://{addr}/v1/"),
    };
    settings
}

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::new(Role::User, "hello"),
        ],
        temperature: 0.3,
        max_tokens: 64,
    }
}

#[tokio::test]
async fn test_openai_sends_bearer_token_and_parameters() {
    let (addr, log) = start_mock().await;
    let provider = build_provider(&settings(ProviderKind::OpenAi, addr, "gpt-test")).unwrap();

    let answer = provider.generate(&request()).await.unwrap();

    assert_eq!(provider.name(), "openai");
    assert_eq!(answer, "from gpt-test");
    let seen = log.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].headers["authorization"], "Bearer sk-test");
    assert_eq!(seen[0].body["max_tokens"], 64);
    assert_eq!(seen[0].body["messages"][0]["role"], "system");
    assert_eq!(seen[0].body["messages"][1]["content"], "hello");
}

#[tokio::test]
async fn test_openrouter_adds_attribution_headers() {
    let (addr, log) = start_mock().await;
    let mut settings = settings(ProviderKind::OpenRouter, addr, "router-model");
    settings.openrouter_site_url = "https://desk.example".to_owned();
    settings.openrouter_app_name = "Desk".to_owned();
    let provider = build_provider(&settings).unwrap();

    assert_eq!(provider.generate(&request()).await.unwrap(), "from router-model");

    let seen = log.lock().await;
    assert_eq!(seen[0].headers["http-referer"], "https://desk.example");
    assert_eq!(seen[0].headers["x-title"], "Desk");
}

#[tokio::test]
async fn test_server_error_is_reported_with_status() {
    let (addr, _log) = start_mock().await;
    let provider = build_provider(&settings(ProviderKind::OpenAi, addr, "failing-model")).unwrap();

    let err = provider.generate(&request()).await.unwrap_err();

    assert!(matches!(err, AiError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_groq_retries_once_with_fallback_model() {
    let (addr, log) = start_mock().await;
    let mut settings = settings(ProviderKind::Groq, addr, "failing-model");
    settings.fallback_model = Some("backup-model".to_owned());
    let provider = build_provider(&settings).unwrap();

    let answer = provider.generate(&request()).await.unwrap();

    assert_eq!(answer, "from backup-model");
    let models: Vec<String> = log.lock().await.iter().map(|s| s.model.clone()).collect();
    assert_eq!(models, vec!["failing-model", "backup-model"]);
}

#[tokio::test]
async fn test_groq_without_distinct_fallback_fails_after_one_call() {
    let (addr, log) = start_mock().await;
    let mut settings = settings(ProviderKind::Groq, addr, "failing-model");
    settings.fallback_model = Some("failing-model".to_owned());
    let provider = build_provider(&settings).unwrap();

    assert!(provider.generate(&request()).await.is_err());
    assert_eq!(log.lock().await.len(), 1);
}

#[tokio::test]
async fn test_empty_answer_is_not_retried() {
    let (addr, log) = start_mock().await;
    let mut settings = settings(ProviderKind::Groq, addr, "empty-model");
    settings.fallback_model = Some("backup-model".to_owned());
    let provider = build_provider(&settings).unwrap();

    let err = provider.generate(&request()).await.unwrap_err();

    assert!(matches!(err, AiError::EmptyResponse));
    assert_eq!(log.lock().await.len(), 1);
}

#[tokio::test]
async fn test_ollama_uses_chat_endpoint_without_streaming() {
    let (addr, log) = start_mock().await;
    let provider = build_provider(&settings(ProviderKind::Ollama, addr, "llama3")).unwrap();

    let answer = provider.generate(&request()).await.unwrap();

    assert_eq!(provider.name(), "ollama");
    assert_eq!(answer, "local llama3");
    let seen = log.lock().await;
    assert_eq!(seen[0].body["stream"], false);
    assert!(seen[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_unreachable_provider_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let provider = build_provider(&settings(ProviderKind::OpenAi, addr, "gpt-test")).unwrap();

    let err = provider.generate(&request()).await.unwrap_err();

    assert!(matches!(err, AiError::Transport(_)));
}
