//! Usage ledger records.
//!
//! One [`UsageRecord`] is written per external call attempt, successful or
//! not, and per cache hit. The rate and budget guard rebuilds its rolling
//! aggregates from these records alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of work a usage record accounts for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    /// A chat turn answered through the main completion call
    #[default]
    Chat,
    /// A thread summarization call
    Summary,
    /// A structured course-advice call
    Advice,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Summary => "summary",
            Self::Advice => "advice",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "summary" => Self::Summary,
            "advice" => Self::Advice,
            _ => Self::Chat,
        }
    }
}

/// Flags distinguishing how a usage record came about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageFlags {
    #[serde(default)]
    pub kind: UsageKind,

    /// Answer served from the response cache; no provider call was made
    #[serde(default)]
    pub cache_hit: bool,

    /// The provider call failed or timed out and a fallback was delivered
    #[serde(default)]
    pub degraded: bool,
}

impl UsageFlags {
    pub fn of(kind: UsageKind) -> Self {
        Self { kind, ..Self::default() }
    }

    pub fn cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

/// An immutable usage log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Actual (provider-reported) or estimated token count
    pub tokens: u64,
    pub flags: UsageFlags,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        user_id: impl Into<String>,
        thread_id: Option<String>,
        tokens: u64,
        flags: UsageFlags,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            thread_id,
            tokens,
            flags,
            created_at: Utc::now(),
        }
    }

    /// Override the timestamp (backfills and tests).
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
