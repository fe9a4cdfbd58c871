//! Context window manager: bounds the history handed to the provider.
//!
//! A thread's history is its ordered message list minus the current user
//! message. While the part not yet covered by a summary stays within the
//! threshold it is passed verbatim. Once it grows past the threshold, every
//! message except the retained tail is folded (together with any earlier
//! summary) into a fresh summary that is cached on the thread.
//!
//! Summaries are therefore regenerated about once every
//! `threshold - retained_tail` messages, not on every turn.

use crate::context::token;
use chrono::Utc;
use finmentor_core::error::StoreError;
use finmentor_core::message::{Message, Role, Thread, ThreadSummary};
use finmentor_core::provider::{Provider, ProviderRequest, Turn};
use finmentor_core::store::Store;
use finmentor_core::usage::{UsageFlags, UsageKind, UsageRecord};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUMMARY_INSTRUCTION: &str = "Summarize the following financial mentoring conversation briefly. \
Focus on the user's goals, questions asked, and progress made. Keep it under 150 words:";

/// The capped context for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedContext {
    /// Condensed older history, if any.
    pub summary: Option<String>,
    /// Recent messages passed verbatim, oldest first.
    pub tail: Vec<Message>,
    /// The current user message.
    pub current: String,
    /// A summarization call was attempted for this turn.
    pub summarized: bool,
}

impl BoundedContext {
    /// The tail as provider turns.
    pub fn prior_turns(&self) -> Vec<Turn> {
        self.tail.iter().map(Turn::from).collect()
    }
}

/// Assembles bounded context, summarizing old history when needed.
pub struct ContextWindowManager {
    store: Arc<dyn Store>,
    provider: Arc<dyn Provider>,
    model: String,
    threshold: usize,
    retained_tail: usize,
}

impl ContextWindowManager {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            store,
            provider,
            model: model.into(),
            threshold: 12,
            retained_tail: 8,
        }
    }

    /// Set the summarization threshold and the verbatim tail length.
    ///
    /// The tail is clamped below the threshold.
    pub fn with_window(mut self, threshold: usize, retained_tail: usize) -> Self {
        self.threshold = threshold.max(1);
        self.retained_tail = retained_tail.min(self.threshold - 1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the bounded context for `current`, already appended to `thread`.
    ///
    /// Only store failures are errors; a failed summarization falls back to
    /// the retained tail.
    pub async fn assemble(
        &self,
        thread: &Thread,
        user_id: &str,
        current: &Message,
    ) -> Result<BoundedContext, StoreError> {
        let history: Vec<Message> = self
            .store
            .list_messages(&thread.id)
            .await?
            .into_iter()
            .filter(|m| m.id != current.id)
            .collect();

        let previous = thread.summary.as_ref();
        let covered = previous
            .map(|s| s.covered_messages.min(history.len()))
            .unwrap_or(0);
        let previous_text = previous.filter(|_| covered > 0).map(|s| s.text.clone());

        if history.len() - covered <= self.threshold {
            return Ok(BoundedContext {
                summary: previous_text,
                tail: history[covered..].to_vec(),
                current: current.content.clone(),
                summarized: false,
            });
        }

        let cut = history.len() - self.retained_tail;
        let evicted = &history[covered..cut];
        let tail = history[cut..].to_vec();

        info!(
            thread_id = %thread.id,
            history = history.len(),
            folding = evicted.len(),
            retained = tail.len(),
            "Summarizing thread history"
        );

        let summary = match self
            .summarize(previous_text.as_deref(), evicted, user_id, &thread.id)
            .await
        {
            Some(text) => {
                let record = ThreadSummary {
                    text: text.clone(),
                    covered_messages: cut,
                    generated_at: Utc::now(),
                };
                if let Err(e) = self.store.save_summary(&thread.id, record).await {
                    warn!(thread_id = %thread.id, error = %e, "Failed to cache thread summary");
                }
                Some(text)
            }
            None => previous_text,
        };

        Ok(BoundedContext {
            summary,
            tail,
            current: current.content.clone(),
            summarized: true,
        })
    }

    /// One summarization call. Always writes a usage record.
    async fn summarize(
        &self,
        previous: Option<&str>,
        messages: &[Message],
        user_id: &str,
        thread_id: &str,
    ) -> Option<String> {
        let request = ProviderRequest::new(&self.model, summary_prompt(previous, messages))
            .with_temperature(0.3);

        let (text, tokens, flags) = match self.provider.complete(request.clone()).await {
            Ok(response) => {
                let tokens = token::call_tokens(&request, &response);
                (Some(response.text.trim().to_string()), tokens, UsageFlags::of(UsageKind::Summary))
            }
            Err(e) => {
                warn!(thread_id, error = %e, "Summarization failed, keeping retained tail only");
                (
                    None,
                    token::failed_call_tokens(&request),
                    UsageFlags::of(UsageKind::Summary).degraded(),
                )
            }
        };

        let record = UsageRecord::new(user_id, Some(thread_id.to_string()), tokens, flags);
        if let Err(e) = self.store.write_usage(record).await {
            warn!(thread_id, error = %e, "Failed to record summarization usage");
        }

        debug!(thread_id, tokens, ok = text.is_some(), "Summarization finished");
        text.filter(|t| !t.is_empty())
    }
}

fn summary_prompt(previous: Option<&str>, messages: &[Message]) -> String {
    let mut prompt = String::from(SUMMARY_INSTRUCTION);
    prompt.push_str("\n\n");
    if let Some(previous) = previous {
        prompt.push_str("Earlier summary:\n");
        prompt.push_str(previous);
        prompt.push_str("\n\n");
    }
    for message in messages {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Mentor",
        };
        prompt.push_str(&format!("{speaker}: {}\n", message.content));
    }
    prompt
}
