//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use di::{Ref, ServiceProvider};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use support_desk::config::Settings;
use support_desk::core::services::SupportService;
use support_desk::core::traits::{
    AiError, AiProvider, CompletionRequest, DeliveryError, Notifier, Outbound,
};
use tokio::sync::Mutex;

pub const ADMIN: i64 = 900;
pub const CLIENT: i64 = 100;
pub const STRANGER: i64 = 555;

/// Replies from a script, then falls back to a fixed answer.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, AiError>>>,
    default_answer: String,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default_answer: answer.to_owned(),
            calls: AtomicUsize::new(0),
        })
    }

    pub async fn push(&self, reply: Result<String, AiError>) {
        self.script.lock().await.push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, _request: &CompletionRequest) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(reply) => reply,
            None => Ok(self.default_answer.clone()),
        }
    }
}

/// Records every delivery. Chats in `unreachable` fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, Outbound)>>,
    photos: Mutex<Vec<(i64, String)>>,
    unreachable: Mutex<HashSet<i64>>,
}

impl RecordingNotifier {
    pub async fn block(&self, chat_id: i64) {
        self.unreachable.lock().await.insert(chat_id);
    }

    pub async fn to(&self, chat_id: i64) -> Vec<Outbound> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub async fn last_to(&self, chat_id: i64) -> Option<Outbound> {
        self.to(chat_id).await.pop()
    }

    pub async fn photos(&self) -> Vec<(i64, String)> {
        self.photos.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, message: Outbound) -> Result<(), DeliveryError> {
        if self.unreachable.lock().await.contains(&chat_id) {
            return Err(DeliveryError {
                chat_id,
                reason: "blocked".to_owned(),
            });
        }
        self.sent.lock().await.push((chat_id, message));
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_ref: &str,
        _caption: String,
    ) -> Result<(), DeliveryError> {
        self.photos.lock().await.push((chat_id, file_ref.to_owned()));
        Ok(())
    }
}

pub fn settings(extra: &[(&str, &str)]) -> Settings {
    let mut vars: HashMap<String, String> = [
        ("TELEGRAM_BOT_TOKEN", "test-token"),
        ("SUPPORT_MEMBER_IDS", "100,101"),
        ("SUPPORT_ADMIN_IDS", "900"),
        ("OPENAI_API_KEY", "sk-test"),
        ("RATE_LIMIT_PER_MIN", "5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub struct Harness {
    pub service: Ref<SupportService>,
    pub provider: Arc<ScriptedProvider>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Builds the same singleton graph the binary uses, around the fakes.
pub fn container(extra: &[(&str, &str)]) -> (ServiceProvider, Arc<ScriptedProvider>, Arc<RecordingNotifier>) {
    let provider = ScriptedProvider::answering("Restart the app and try again.");
    let notifier = Arc::new(RecordingNotifier::default());
    let services = support_desk::services(settings(extra), provider.clone(), notifier.clone())
        .build_provider()
        .unwrap();
    (services, provider, notifier)
}

pub fn harness(extra: &[(&str, &str)]) -> Harness {
    let (services, provider, notifier) = container(extra);
    Harness {
        service: services.get_required::<SupportService>(),
        provider,
        notifier,
    }
}
