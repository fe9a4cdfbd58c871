//! Thread and Message domain types.
//!
//! These are the value objects that flow through the whole pipeline:
//! a user message is appended to a thread, the orchestrator answers it, and
//! the answer is appended to the same thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to a message (action-card payload, flags, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The role of a message sender in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "ASSISTANT" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single persisted message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Owning thread
    pub thread_id: String,

    /// Who sent this message
    pub role: Role,

    /// The literal text content
    pub content: String,

    /// Optional structured metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message for `thread_id`, stamped now.
    pub fn new(thread_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            role,
            content: content.into(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A condensed rendering of the oldest part of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// The condensed text
    pub text: String,

    /// How many leading messages of the thread the text stands in for
    pub covered_messages: usize,

    /// When it was produced
    pub generated_at: DateTime<Utc>,
}

/// An ordered conversation owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Unique thread ID
    pub id: String,

    /// Owning user
    pub owner_id: String,

    /// Display title (may be set from the first message)
    pub title: String,

    /// Optional category tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Cached summary of the older messages, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ThreadSummary>,

    pub created_at: DateTime<Utc>,

    /// Bumped on every append
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>, category: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            title: title.into(),
            category,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this thread.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}
