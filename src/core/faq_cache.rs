//! LRU cache of previously generated answers, keyed by normalized question.

use crate::config::Settings;
use di::{Ref, inject, injectable};
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

/// Case-folded, trimmed form of a prompt used as the cache key.
pub fn normalize(prompt: &str) -> String {
    prompt.trim().to_lowercase()
}

pub struct FaqCache {
    entries: Mutex<LruCache<String, String>>,
    min_len: usize,
}

#[injectable]
impl FaqCache {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> FaqCache {
        FaqCache::new(settings.faq_cache_max, settings.faq_min_len)
    }
}

impl FaqCache {
    pub fn new(capacity: NonZeroUsize, min_len: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            min_len,
        }
    }

    /// Returns the normalized key, or `None` when the prompt is too short to
    /// be cached.
    pub fn key_for(&self, prompt: &str) -> Option<String> {
        let key = normalize(prompt);
        (key.chars().count() >= self.min_len).then_some(key)
    }

    /// Looks up a prompt and promotes it to most recently used on a hit.
    pub async fn get(&self, prompt: &str) -> Option<String> {
        let key = self.key_for(prompt)?;
        self.entries.lock().await.get(&key).cloned()
    }

    /// Inserts or overwrites an answer, evicting the least recently used
    /// entry once capacity is exceeded. Returns whether it was stored.
    pub async fn put(&self, prompt: &str, answer: String) -> bool {
        let Some(key) = self.key_for(prompt) else {
            return false;
        };
        self.entries.lock().await.put(key, answer);
        true
    }

    pub async fn contains(&self, prompt: &str) -> bool {
        match self.key_for(prompt) {
            Some(key) => self.entries.lock().await.contains(&key),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> FaqCache {
        FaqCache::new(NonZeroUsize::new(capacity).unwrap(), 12)
    }

    #[tokio::test]
    async fn test_keys_differing_in_case_and_whitespace_share_an_entry() {
        let cache = cache(4);
        cache
            .put("How do I renew my plan?", "Go to billing.".to_owned())
            .await;

        assert_eq!(
            cache.get("  HOW DO I RENEW MY PLAN?\n").await.as_deref(),
            Some("Go to billing.")
        );
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_short_prompts_are_never_stored() {
        let cache = cache(4);
        for _ in 0..10 {
            assert!(!cache.put("hello", "Hi!".to_owned()).await);
        }
        assert!(cache.is_empty().await);
        assert_eq!(cache.get("hello").await, None);
    }

    #[tokio::test]
    async fn test_overflow_evicts_least_recently_used() {
        let cache = cache(2);
        cache.put("first question here", "1".to_owned()).await;
        cache.put("second question here", "2".to_owned()).await;
        cache.put("third question here", "3".to_owned()).await;

        assert!(!cache.contains("first question here").await);
        assert!(cache.contains("second question here").await);
        assert!(cache.contains("third question here").await);
    }

    #[tokio::test]
    async fn test_hit_changes_eviction_order() {
        let cache = cache(2);
        cache.put("first question here", "1".to_owned()).await;
        cache.put("second question here", "2".to_owned()).await;

        assert!(cache.get("first question here").await.is_some());
        cache.put("third question here", "3".to_owned()).await;

        assert!(cache.contains("first question here").await);
        assert!(!cache.contains("second question here").await);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_size() {
        let cache = cache(2);
        cache.put("first question here", "1".to_owned()).await;
        cache.put("FIRST question here", "updated".to_owned()).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.get("first question here").await.as_deref(),
            Some("updated")
        );
    }
}
