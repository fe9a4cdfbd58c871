//! In-memory store: useful for testing and one-shot sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use finmentor_core::error::StoreError;
use finmentor_core::message::{Message, Metadata, Role, Thread, ThreadSummary};
use finmentor_core::store::Store;
use finmentor_core::usage::UsageRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    threads: HashMap<String, Thread>,
    /// Messages per thread, in append order.
    messages: HashMap<String, Vec<Message>>,
    usage: Vec<UsageRecord>,
}

/// A store that keeps everything in process memory.
/// Nothing survives a restart.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Number of usage records written so far (all users).
    pub async fn usage_len(&self) -> usize {
        self.state.read().await.usage.len()
    }

    /// Copy of every usage record, in write order.
    pub async fn usage_records(&self) -> Vec<UsageRecord> {
        self.state.read().await.usage.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_thread(
        &self,
        owner_id: &str,
        title: &str,
        category: Option<&str>,
    ) -> Result<Thread, StoreError> {
        let thread = Thread::new(owner_id, title, category.map(str::to_string));
        let mut state = self.state.write().await;
        state.messages.insert(thread.id.clone(), Vec::new());
        state.threads.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        Ok(self.state.read().await.threads.get(thread_id).cloned())
    }

    async fn list_threads(&self, owner_id: &str) -> Result<Vec<Thread>, StoreError> {
        let state = self.state.read().await;
        let mut threads: Vec<Thread> = state
            .threads
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        thread.title = title.to_string();
        Ok(())
    }

    async fn save_summary(&self, thread_id: &str, summary: ThreadSummary) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        thread.summary = Some(summary);
        Ok(())
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<Message, StoreError> {
        let mut state = self.state.write().await;
        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;

        let message = Message::new(thread_id, role, content).with_metadata(metadata.unwrap_or_default());
        thread.updated_at = message.created_at;

        state
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        Ok(state.messages.get(thread_id).cloned().unwrap_or_default())
    }

    async fn count_usage(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        let count = state
            .usage
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .count();
        Ok(count as u64)
    }

    async fn sum_tokens(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .usage
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .map(|r| r.tokens)
            .sum())
    }

    async fn write_usage(&self, record: UsageRecord) -> Result<(), StoreError> {
        self.state.write().await.usage.push(record);
        Ok(())
    }
}
