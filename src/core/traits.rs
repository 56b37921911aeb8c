//! Interfaces to the outside world: the AI backend and the chat platform.

use crate::core::actions::CallbackAction;
use crate::core::assistant::ChatMessage;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AiError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None if e.is_decode() => AiError::Malformed(e.to_string()),
            None => AiError::Transport(e.to_string()),
        }
    }
}

/// A fully assembled prompt. Model selection belongs to the provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// An AI backend. One implementation per provider, selected once at startup.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one completion and returns the answer text.
    ///
    /// Implementations that have a fallback model retry against it at most
    /// once before returning the error.
    async fn generate(&self, request: &CompletionRequest) -> Result<String, AiError>;
}

#[derive(Debug, Error)]
#[error("delivery to chat {chat_id} failed: {reason}")]
pub struct DeliveryError {
    pub chat_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Button {
    Callback { label: String, action: CallbackAction },
    Link { label: String, url: String },
}

impl Button {
    pub fn callback(label: impl Into<String>, action: CallbackAction) -> Self {
        Button::Callback {
            label: label.into(),
            action,
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Button::Link {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Text plus an optional inline keyboard, laid out row by row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outbound {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.keyboard.push(row);
        self
    }

    /// Every callback action attached to this message.
    pub fn actions(&self) -> impl Iterator<Item = &CallbackAction> {
        self.keyboard.iter().flatten().filter_map(|button| match button {
            Button::Callback { action, .. } => Some(action),
            Button::Link { .. } => None,
        })
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, message: Outbound) -> Result<(), DeliveryError>;

    /// Sends a previously uploaded photo by its platform file reference.
    async fn send_photo(
        &self,
        chat_id: i64,
        file_ref: &str,
        caption: String,
    ) -> Result<(), DeliveryError>;
}
