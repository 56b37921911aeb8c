//! Process configuration, read from the environment and validated at startup.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Groq,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "groq" => Ok(ProviderKind::Groq),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!(
                "`{other}` is not one of openai, openrouter, groq, ollama"
            )),
        }
    }
}

impl ProviderKind {
    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::OpenRouter => "openai/gpt-4o-mini",
            ProviderKind::Groq => "llama-3.1-70b-versatile",
            ProviderKind::Ollama => "llama3.1:8b-instruct",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    fn default_timeout_secs(&self) -> u64 {
        match self {
            ProviderKind::Ollama => 120,
            _ => 60,
        }
    }

    /// Variable holding the API key; Ollama runs locally without one.
    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    fn base_url_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_BASE_URL",
            ProviderKind::OpenRouter => "OPENROUTER_BASE_URL",
            ProviderKind::Groq => "GROQ_BASE_URL",
            ProviderKind::Ollama => "OLLAMA_BASE_URL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key: Option<String>,
    pub base_url: String,
    /// Only used by Groq.
    pub fallback_model: Option<String>,
    pub openrouter_site_url: String,
    pub openrouter_app_name: String,
    pub timeout: Duration,
}

impl AiSettings {
    /// Settings for `provider` with every optional value at its default.
    pub fn for_provider(provider: ProviderKind) -> Self {
        Self {
            provider,
            model: provider.default_model().to_owned(),
            temperature: 0.2,
            max_tokens: 512,
            api_key: None,
            base_url: provider.default_base_url().to_owned(),
            fallback_model: (provider == ProviderKind::Groq)
                .then(|| "llama-3.1-8b-instant".to_owned()),
            openrouter_site_url: "https://localhost".to_owned(),
            openrouter_app_name: "Support Desk Bot".to_owned(),
            timeout: Duration::from_secs(provider.default_timeout_secs()),
        }
    }
}

/// Who may talk to the bot and who administers tickets.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub allow_all: bool,
    pub members: HashSet<i64>,
    pub admins: HashSet<i64>,
    pub admin_group: Option<i64>,
}

impl AccessPolicy {
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.allow_all || self.members.contains(&user_id) || self.is_admin(user_id)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Chats that receive ticket notifications: the admin group if set,
    /// otherwise every admin individually.
    pub fn admin_destinations(&self) -> Vec<i64> {
        match self.admin_group {
            Some(group) => vec![group],
            None => {
                let mut admins: Vec<i64> = self.admins.iter().copied().collect();
                admins.sort_unstable();
                admins
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub access: AccessPolicy,
    pub site_url: Option<String>,
    pub ai: AiSettings,
    pub rate_limit_per_min: usize,
    pub kb_path: Option<PathBuf>,
    pub kb_max_chars: usize,
    pub faq_cache_max: NonZeroUsize,
    pub faq_min_len: usize,
    pub port: u16,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Settings, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable source. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let mut missing = Vec::new();

        let bot_token = get("TELEGRAM_BOT_TOKEN");
        if bot_token.is_none() {
            missing.push("TELEGRAM_BOT_TOKEN");
        }

        let allow_all = get("SUPPORT_ALLOW_ALL")
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"));
        let members = match get("SUPPORT_MEMBER_IDS") {
            Some(raw) => parse_ids("SUPPORT_MEMBER_IDS", &raw)?,
            None => {
                if !allow_all {
                    missing.push("SUPPORT_MEMBER_IDS");
                }
                HashSet::new()
            }
        };
        let admins = match get("SUPPORT_ADMIN_IDS") {
            Some(raw) => parse_ids("SUPPORT_ADMIN_IDS", &raw)?,
            None => HashSet::new(),
        };
        let admin_group = parse_opt("SUPPORT_ADMIN_GROUP_ID", get("SUPPORT_ADMIN_GROUP_ID"))?;

        let provider: ProviderKind = parse_opt("AI_PROVIDER", get("AI_PROVIDER"))?
            .unwrap_or(ProviderKind::OpenAi);
        let mut ai = AiSettings::for_provider(provider);
        if let Some(var) = provider.api_key_var() {
            ai.api_key = get(var);
            if ai.api_key.is_none() {
                missing.push(var);
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if let Some(model) = get("AI_MODEL") {
            ai.model = model;
        }
        if let Some(url) = get(provider.base_url_var()) {
            ai.base_url = url;
        }
        if let Some(temperature) = parse_opt("AI_TEMPERATURE", get("AI_TEMPERATURE"))? {
            ai.temperature = temperature;
        }
        if let Some(max_tokens) = parse_opt("AI_MAX_TOKENS", get("AI_MAX_TOKENS"))? {
            ai.max_tokens = max_tokens;
        }
        if let Some(secs) = parse_opt("AI_TIMEOUT_SECS", get("AI_TIMEOUT_SECS"))? {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "AI_TIMEOUT_SECS",
                    reason: "must be at least 1".to_owned(),
                });
            }
            ai.timeout = Duration::from_secs(secs);
        }
        if provider == ProviderKind::Groq {
            if let Some(fallback) = get("GROQ_FALLBACK_MODEL") {
                ai.fallback_model = Some(fallback);
            }
        }
        if let Some(site) = get("OPENROUTER_SITE_URL") {
            ai.openrouter_site_url = site;
        }
        if let Some(name) = get("OPENROUTER_APP_NAME") {
            ai.openrouter_app_name = name;
        }

        let rate_limit_per_min = parse_opt("RATE_LIMIT_PER_MIN", get("RATE_LIMIT_PER_MIN"))?
            .unwrap_or(12);
        if rate_limit_per_min == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_PER_MIN",
                reason: "must be at least 1".to_owned(),
            });
        }

        let faq_cache_max = parse_opt::<usize>("FAQ_CACHE_MAX", get("FAQ_CACHE_MAX"))?
            .unwrap_or(200);
        let faq_cache_max = NonZeroUsize::new(faq_cache_max).ok_or(ConfigError::Invalid {
            key: "FAQ_CACHE_MAX",
            reason: "must be at least 1".to_owned(),
        })?;

        Ok(Settings {
            bot_token: bot_token.unwrap_or_default(),
            access: AccessPolicy {
                allow_all,
                members,
                admins,
                admin_group,
            },
            site_url: get("SUPPORT_SITE_URL"),
            ai,
            rate_limit_per_min,
            kb_path: get("KB_PATH").map(PathBuf::from),
            kb_max_chars: parse_opt("KB_MAX_CHARS", get("KB_MAX_CHARS"))?.unwrap_or(100_000),
            faq_cache_max,
            faq_min_len: parse_opt("FAQ_MIN_LEN", get("FAQ_MIN_LEN"))?.unwrap_or(12),
            port: parse_opt("PORT", get("PORT"))?.unwrap_or(8000),
        })
    }
}

fn parse_opt<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|raw| {
        raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
    })
    .transpose()
}

fn parse_ids(key: &'static str, raw: &str) -> Result<HashSet<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|_| ConfigError::Invalid {
                key,
                reason: format!("`{part}` is not a numeric id"),
            })
        })
        .collect()
}
