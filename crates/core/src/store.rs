//! Store trait: persistence for threads, messages, and the usage ledger.
//!
//! The orchestration core never touches a database directly; it depends on
//! this narrow contract. Single-row operations are assumed to be at least
//! read-committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::error::StoreError;
use crate::message::{Message, Metadata, Role, Thread, ThreadSummary};
use crate::usage::UsageRecord;

/// The core Store trait.
///
/// Implementations: in-memory (for tests and one-shot runs), SQLite.
#[async_trait]
pub trait Store: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Create a thread owned by `owner_id`.
    async fn create_thread(
        &self,
        owner_id: &str,
        title: &str,
        category: Option<&str>,
    ) -> std::result::Result<Thread, StoreError>;

    /// Fetch a thread by ID.
    async fn get_thread(&self, thread_id: &str) -> std::result::Result<Option<Thread>, StoreError>;

    /// All threads of a user, most recently updated first.
    async fn list_threads(&self, owner_id: &str) -> std::result::Result<Vec<Thread>, StoreError>;

    /// Replace a thread's title.
    async fn rename_thread(&self, thread_id: &str, title: &str) -> std::result::Result<(), StoreError>;

    /// Cache a summary of the thread's oldest messages.
    async fn save_summary(
        &self,
        thread_id: &str,
        summary: ThreadSummary,
    ) -> std::result::Result<(), StoreError>;

    /// Append a message and bump the thread's `updated_at`.
    async fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Metadata>,
    ) -> std::result::Result<Message, StoreError>;

    /// Messages of a thread, creation time ascending.
    async fn list_messages(&self, thread_id: &str) -> std::result::Result<Vec<Message>, StoreError>;

    /// Number of usage records for `user_id` at or after `since`.
    async fn count_usage(&self, user_id: &str, since: DateTime<Utc>) -> std::result::Result<u64, StoreError>;

    /// Sum of tokens in usage records for `user_id` at or after `since`.
    async fn sum_tokens(&self, user_id: &str, since: DateTime<Utc>) -> std::result::Result<u64, StoreError>;

    /// Append a usage record.
    async fn write_usage(&self, record: UsageRecord) -> std::result::Result<(), StoreError>;
}
