//! ResponseCache trait: best-effort, content-addressed answer cache.
//!
//! A miss never blocks correctness, so implementations swallow their own
//! failures and report them as misses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached answer: the raw provider text plus when it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// The backend name (e.g., "memory", "none").
    fn name(&self) -> &str;

    /// Look up a fingerprint. Expired entries are misses.
    async fn get(&self, fingerprint: &str) -> Option<CacheEntry>;

    /// Store an answer. Last write wins.
    async fn put(&self, fingerprint: &str, text: &str);
}
