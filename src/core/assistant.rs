//! AI answer dispatcher.
//!

use crate::config::Settings;
use crate::core::faq_cache::FaqCache;
use crate::core::knowledge::KnowledgeBase;
use crate::core::traits::{AiError, AiProvider, CompletionRequest};
use crate::infrastructure::entities::Category;
use di::{Ref, inject, injectable};
use log::{debug, error, warn};
use serde::Serialize;

pub const DEGRADED_ANSWER: &str =
    "Something went wrong with the AI service. Please try again later.";
pub const NO_ANSWER: &str = "Sorry, I don't have an answer for that right now.";

const SYSTEM_TEMPLATE: &str = r#"You are the official support assistant of this service.
Requirements:
- Answer in the user's language with a professional, empathetic tone.
- Keep answers short and actionable, with numbered steps when useful.
- Always restate the problem in one line, give 2-5 concrete steps,
  and add "If that does not work" with 1-2 alternatives.
- Scope: group access, subscription and payment, signals and strategies, Telegram usage.
- Out of scope: say so politely and point to a resource.
- Plain text only, no Markdown or HTML formatting.
{% if knowledge %}

Company context (summary, do not repeat verbatim):
{{ knowledge }}
{% endif %}"#;

const EXAMPLE_QUESTION: &str = "I can't get into the private Telegram group after paying.";
const EXAMPLE_ANSWER: &str = "Problem: no access to the private group after payment.
1) Check that your Telegram ID is the one you gave when signing up.
2) Restart the Telegram app and open the invitation again.
3) If you never received an invitation, send your receipt and your @username.
If that does not work: reply with your ID (/id) so we can verify it.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Cache,
    Provider,
    /// A canned fallback produced because the provider failed or said nothing.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct Assistant {
    provider: Ref<dyn AiProvider>,
    cache: Ref<FaqCache>,
    knowledge: Ref<KnowledgeBase>,
    settings: GenerationSettings,
    templates: minijinja::Environment<'static>,
}

#[injectable]
impl Assistant {
    #[inject]
    pub fn create(
        provider: Ref<dyn AiProvider>,
        cache: Ref<FaqCache>,
        knowledge: Ref<KnowledgeBase>,
        settings: Ref<Settings>,
    ) -> Assistant {
        Assistant::new(
            provider,
            cache,
            knowledge,
            GenerationSettings {
                temperature: settings.ai.temperature,
                max_tokens: settings.ai.max_tokens,
            },
        )
    }
}

impl Assistant {
    pub fn new(
        provider: Ref<dyn AiProvider>,
        cache: Ref<FaqCache>,
        knowledge: Ref<KnowledgeBase>,
        settings: GenerationSettings,
    ) -> Self {
        let mut templates = minijinja::Environment::new();
        templates.set_trim_blocks(true);
        // The template is a compile-time constant; a syntax error here is a bug.
        if let Err(e) = templates.add_template("system", SYSTEM_TEMPLATE) {
            error!("invalid system prompt template: {e}");
        }

        Self {
            provider,
            cache,
            knowledge,
            settings,
            templates,
        }
    }

    pub fn cache(&self) -> &Ref<FaqCache> {
        &self.cache
    }

    pub fn knowledge(&self) -> &Ref<KnowledgeBase> {
        &self.knowledge
    }

    /// Answers a prompt from the FAQ cache or the provider. Never fails:
    /// provider errors become a degraded answer.
    pub async fn answer(&self, prompt: &str) -> Answer {
        if let Some(text) = self.cache.get(prompt).await {
            debug!("FAQ cache hit");
            return Answer {
                text,
                source: AnswerSource::Cache,
            };
        }

        let request = match self.build_request(prompt).await {
            Ok(request) => request,
            Err(e) => {
                error!("failed to render system prompt: {e}");
                return degraded(DEGRADED_ANSWER);
            }
        };

        match self.provider.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => Answer {
                text,
                source: AnswerSource::Provider,
            },
            Ok(_) | Err(AiError::EmptyResponse) => {
                warn!("AI provider {} returned an empty answer", self.provider.name());
                degraded(NO_ANSWER)
            }
            Err(e) => {
                error!("AI provider {} failed: {e}", self.provider.name());
                degraded(DEGRADED_ANSWER)
            }
        }
    }

    /// Stores a fresh provider answer in the FAQ cache. Cached and degraded
    /// answers are skipped.
    pub async fn remember(&self, prompt: &str, answer: &Answer) -> bool {
        if answer.source != AnswerSource::Provider {
            return false;
        }
        self.cache.put(prompt, answer.text.clone()).await
    }

    /// One-shot classification of a problem description. Returns the first
    /// non-empty line of the answer as a category, or `None` if the provider
    /// failed.
    pub async fn classify(&self, description: &str) -> Option<Category> {
        let fixed = Category::FIXED;
        let labels: Vec<&str> = fixed.iter().map(Category::label).collect();
        let prompt = format!(
            "Classify this problem as one of: {}. Reply with the label only.\n\n{description}",
            labels.join(", ")
        );

        let answer = self.answer(&prompt).await;
        if answer.source == AnswerSource::Degraded {
            return None;
        }

        answer
            .text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(Category::from_label)
    }

    async fn build_request(&self, prompt: &str) -> Result<CompletionRequest, minijinja::Error> {
        let knowledge = self.knowledge.text().await;
        let system = self
            .templates
            .get_template("system")?
            .render(minijinja::context! { knowledge => knowledge })?;

        Ok(CompletionRequest {
            messages: vec![
                ChatMessage::new(Role::System, system),
                ChatMessage::new(Role::User, EXAMPLE_QUESTION),
                ChatMessage::new(Role::Assistant, EXAMPLE_ANSWER),
                ChatMessage::new(Role::User, prompt),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        })
    }
}

fn degraded(text: &str) -> Answer {
    Answer {
        text: text.to_owned(),
        source: AnswerSource::Degraded,
    }
}
