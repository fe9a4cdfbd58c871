//! Response cache implementations and prompt fingerprinting.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use finmentor_core::cache::{CacheEntry, ResponseCache};
use finmentor_core::locale::Locale;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

const KEY_PREFIX: &str = "ai_response:";

/// Stable cache key for a question asked in `locale`.
///
/// Case and whitespace runs are collapsed before hashing, so
/// `"  What is  X? "` and `"what is x?"` share a key.
pub fn fingerprint(question: &str, locale: Locale) -> String {
    let normalized = question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(format!("{}:{normalized}", locale.code()).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{KEY_PREFIX}{hex}")
}

/// Process-local cache with a TTL and an entry ceiling.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: TimeDelta,
    max_entries: usize,
}

impl InMemoryCache {
    /// A TTL beyond the representable range never expires.
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: i64::try_from(ttl_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        Utc::now().signed_duration_since(entry.created_at) < self.ttl
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries
            .get(fingerprint)
            .filter(|entry| self.is_fresh(entry))
            .cloned()
    }

    async fn put(&self, fingerprint: &str, text: &str) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(fingerprint) {
            entries.retain(|_, entry| self.is_fresh(entry));
            if entries.len() >= self.max_entries {
                // Still full: evict the oldest entry.
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(key, _)| key.clone())
                {
                    entries.remove(&oldest);
                }
            }
            debug!(remaining = entries.len(), "Response cache evicted entries");
        }

        entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                text: text.to_string(),
                created_at: Utc::now(),
            },
        );
    }
}

/// A cache that never stores anything. Used when caching is disabled.
pub struct NoopCache;

#[async_trait]
impl ResponseCache for NoopCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn get(&self, _fingerprint: &str) -> Option<CacheEntry> {
        None
    }

    async fn put(&self, _fingerprint: &str, _text: &str) {}
}
