//! HTTP AI providers
//!
//! OpenAI, OpenRouter and Groq speak the same chat-completions dialect and
//! share [`ChatCompletionsClient`]. Ollama has its own `/api/chat` shape.
//! Only Groq defines a fallback model.

use crate::config::{AiSettings, ProviderKind};
use crate::core::assistant::ChatMessage;
use crate::core::traits::{AiError, AiProvider, CompletionRequest};
use async_trait::async_trait;
use log::warn;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct ChatCompletionsBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionsReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaReply {
    message: Option<WireMessage>,
    #[serde(default)]
    choices: Vec<Choice>,
}

fn non_empty(content: Option<String>) -> Result<String, AiError> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or(AiError::EmptyResponse)
}

async fn send(builder: RequestBuilder) -> Result<Response, AiError> {
    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Client for the OpenAI-compatible `/chat/completions` endpoint.
struct ChatCompletionsClient {
    client: Client,
    url: String,
    api_key: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl ChatCompletionsClient {
    fn new(settings: &AiSettings, extra_headers: Vec<(&'static str, String)>) -> Result<Self, AiError> {
        let client = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone().unwrap_or_default(),
            extra_headers,
        })
    }

    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<String, AiError> {
        let body = ChatCompletionsBody {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, value);
        }

        let reply: ChatCompletionsReply = send(builder)
            .await?
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;

        non_empty(
            reply
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message)
                .and_then(|message| message.content),
        )
    }
}

pub struct OpenAiProvider {
    inner: ChatCompletionsClient,
    model: String,
}

impl OpenAiProvider {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        Ok(Self {
            inner: ChatCompletionsClient::new(settings, Vec::new())?,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<String, AiError> {
        self.inner.complete(&self.model, request).await
    }
}

pub struct OpenRouterProvider {
    inner: ChatCompletionsClient,
    model: String,
}

impl OpenRouterProvider {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        let headers = vec![
            ("HTTP-Referer", settings.openrouter_site_url.clone()),
            ("X-Title", settings.openrouter_app_name.clone()),
        ];

        Ok(Self {
            inner: ChatCompletionsClient::new(settings, headers)?,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl AiProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<String, AiError> {
        self.inner.complete(&self.model, request).await
    }
}

pub struct GroqProvider {
    inner: ChatCompletionsClient,
    model: String,
    fallback_model: Option<String>,
}

impl GroqProvider {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        Ok(Self {
            inner: ChatCompletionsClient::new(settings, Vec::new())?,
            model: settings.model.clone(),
            fallback_model: settings
                .fallback_model
                .clone()
                .filter(|fallback| !fallback.is_empty() && *fallback != settings.model),
        })
    }
}

#[async_trait]
impl AiProvider for GroqProvider {
    fn name(&self) -> &'static str {
        "groq"
    }

    /// Retries once against the fallback model when the request itself
    /// fails. An empty answer is not a failure and is not retried.
    async fn generate(&self, request: &CompletionRequest) -> Result<String, AiError> {
        match self.inner.complete(&self.model, request).await {
            Err(AiError::EmptyResponse) => Err(AiError::EmptyResponse),
            Err(e) => match &self.fallback_model {
                Some(fallback) => {
                    warn!(
                        "groq model {} failed ({e}), retrying with {fallback}",
                        self.model
                    );
                    self.inner.complete(fallback, request).await
                }
                None => Err(e),
            },
            ok => ok,
        }
    }
}

pub struct OllamaProvider {
    client: Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        Ok(Self {
            client: Client::builder().timeout(settings.timeout).build()?,
            url: format!("{}/api/chat", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<String, AiError> {
        let body = OllamaBody {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
            },
        };

        let reply: OllamaReply = send(self.client.post(&self.url).json(&body))
            .await?
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;

        let content = reply
            .message
            .and_then(|message| message.content)
            .or_else(|| {
                reply
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message)
                    .and_then(|message| message.content)
            });
        non_empty(content)
    }
}

/// Builds the provider selected in configuration.
pub fn build_provider(settings: &AiSettings) -> Result<Arc<dyn AiProvider>, AiError> {
    let provider: Arc<dyn AiProvider> = match settings.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(settings)?),
        ProviderKind::OpenRouter => Arc::new(OpenRouterProvider::new(settings)?),
        ProviderKind::Groq => Arc::new(GroqProvider::new(settings)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(settings)?),
    };
    Ok(provider)
}
