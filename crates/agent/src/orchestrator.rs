//! The orchestrator: sequences one inbound message end to end.
//!
//! ```text
//! resolve thread ─► guard ─► persist user message ─► classify intent
//!                                                    │
//!                        FAQ + cache hit ◄───────────┤
//!                              │                     ▼
//!                              │        assemble context ─► compose prompt
//!                              │                     │
//!                              │                     ▼
//!                              │           provider call (or fallback)
//!                              ▼                     │
//!                  post-process ◄────────────────────┘
//!                        │
//!                        ▼
//!          persist assistant message ─► usage record ─► reply
//! ```
//!
//! Only the three pre-call rejections (and store outages) reach the caller.
//! Provider and parse failures come back as a degraded reply.

use crate::context::{ContextWindowManager, token};
use crate::postprocess::{
    self, CourseAdvice, Intent, classify_intent, extract_action_card, fallback_reply,
};
use crate::prompt::{self, CourseProgress, PromptInput};
use finmentor_config::AppConfig;
use finmentor_core::behavior::{BehaviorProvider, RewardDescriptor, RewardGranter, StrategySignals};
use finmentor_core::cache::ResponseCache;
use finmentor_core::error::{Rejection, StoreError};
use finmentor_core::locale::Locale;
use finmentor_core::message::{Message, Role, Thread};
use finmentor_core::provider::{Provider, ProviderRequest};
use finmentor_core::store::Store;
use finmentor_core::usage::{UsageFlags, UsageKind, UsageRecord};
use finmentor_store::fingerprint;
use finmentor_telemetry::{GuardLimits, RateBudgetGuard, TelemetryError, UsageSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Longest auto-generated thread title, in characters.
const AUTO_TITLE_CHARS: usize = 60;

/// Errors surfaced by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// Machine code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(rejection) => rejection.code(),
            Self::Store(_) => "STORE_FAILURE",
        }
    }
}

impl From<TelemetryError> for OrchestratorError {
    fn from(e: TelemetryError) -> Self {
        match e {
            TelemetryError::Store(e) => Self::Store(e),
        }
    }
}

/// Terminal state of a delivered turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnStatus {
    Delivered,
    Degraded,
}

/// The assistant's answer to one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub message: Message,
    pub status: TurnStatus,
    pub intent: Intent,
    pub cache_hit: bool,
    /// Tokens charged for this turn (excluding any summarization).
    pub tokens: u64,
}

/// Result of a course-advice request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceReply {
    pub advice: CourseAdvice,
    /// The provider output was unusable and the fixed fallback was returned.
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardDescriptor>,
}

/// Model parameters used for chat and advice calls.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub default_locale: Locale,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".into(),
            temperature: 0.7,
            max_tokens: Some(1024),
            default_locale: Locale::Vi,
        }
    }
}

/// The orchestration façade.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    cache: Arc<dyn ResponseCache>,
    provider: Arc<dyn Provider>,
    guard: RateBudgetGuard,
    context: ContextWindowManager,
    behavior: Arc<dyn BehaviorProvider>,
    reward: Option<Arc<dyn RewardGranter>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create an orchestrator with default limits and window.
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn ResponseCache>,
        provider: Arc<dyn Provider>,
        behavior: Arc<dyn BehaviorProvider>,
    ) -> Self {
        let settings = OrchestratorSettings::default();
        Self {
            guard: RateBudgetGuard::new(store.clone(), GuardLimits::default()),
            context: ContextWindowManager::new(store.clone(), provider.clone(), &settings.model),
            store,
            cache,
            provider,
            behavior,
            reward: None,
            settings,
        }
    }

    /// Create an orchestrator with every knob taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn ResponseCache>,
        provider: Arc<dyn Provider>,
        behavior: Arc<dyn BehaviorProvider>,
        model: impl Into<String>,
    ) -> Self {
        let settings = OrchestratorSettings {
            model: model.into(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            default_locale: Locale::parse_or(&config.default_locale, Locale::Vi),
        };
        Self::new(store, cache, provider, behavior)
            .with_limits(GuardLimits::from(&config.guard), config.guard.serialize_per_user)
            .with_window(config.context.summarize_threshold, config.context.retained_tail)
            .with_settings(settings)
    }

    /// Replace the guard limits.
    pub fn with_limits(mut self, limits: GuardLimits, serialize_per_user: bool) -> Self {
        self.guard =
            RateBudgetGuard::new(self.store.clone(), limits).with_serialization(serialize_per_user);
        self
    }

    /// Set the summarization threshold and retained tail.
    pub fn with_window(mut self, threshold: usize, retained_tail: usize) -> Self {
        self.context = self.context.with_window(threshold, retained_tail);
        self
    }

    /// Attach the variable-reward pre-step.
    pub fn with_reward(mut self, reward: Arc<dyn RewardGranter>) -> Self {
        self.reward = Some(reward);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.context = self.context.with_model(&settings.model);
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Resolve a locale tag, falling back to the configured default.
    pub fn resolve_locale(&self, tag: Option<&str>) -> Locale {
        tag.map(|t| Locale::parse_or(t, self.settings.default_locale))
            .unwrap_or(self.settings.default_locale)
    }

    // ── Threads ───────────────────────────────────────────────────────────

    pub async fn create_thread(
        &self,
        user_id: &str,
        title: &str,
        category: Option<&str>,
    ) -> Result<Thread, OrchestratorError> {
        let thread = self.store.create_thread(user_id, title.trim(), category).await?;
        info!(thread_id = %thread.id, user_id, "Thread created");
        Ok(thread)
    }

    /// The user's threads, most recently updated first.
    pub async fn get_threads(&self, user_id: &str) -> Result<Vec<Thread>, OrchestratorError> {
        Ok(self.store.list_threads(user_id).await?)
    }

    /// A thread owned by `user_id`. Someone else's thread is reported as
    /// missing.
    pub async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread, OrchestratorError> {
        match self.store.get_thread(thread_id).await? {
            Some(thread) if thread.is_owned_by(user_id) => Ok(thread),
            Some(_) => {
                warn!(thread_id, user_id, "Thread requested by non-owner");
                Err(Rejection::ThreadNotFound(thread_id.to_string()).into())
            }
            None => Err(Rejection::ThreadNotFound(thread_id.to_string()).into()),
        }
    }

    /// A thread's messages in creation order.
    pub async fn get_messages(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> Result<Vec<Message>, OrchestratorError> {
        self.get_thread(thread_id, user_id).await?;
        Ok(self.store.list_messages(thread_id).await?)
    }

    pub async fn usage_snapshot(&self, user_id: &str) -> Result<UsageSnapshot, OrchestratorError> {
        Ok(self.guard.snapshot(user_id).await?)
    }

    // ── Chat ──────────────────────────────────────────────────────────────

    /// Process one user message and return the assistant's reply.
    pub async fn send_message(
        &self,
        thread_id: &str,
        user_id: &str,
        text: &str,
        locale: Locale,
    ) -> Result<AssistantReply, OrchestratorError> {
        let thread = self.get_thread(thread_id, user_id).await?;

        let _permit = self.guard.acquire(user_id).await;
        self.guard.check(user_id).await?.into_result()?;

        let user_message = self
            .store
            .append_message(thread_id, Role::User, text, None)
            .await?;
        self.maybe_auto_title(&thread, text).await;

        let intent = classify_intent(text, locale);
        let cache_key = intent.is_cacheable().then(|| fingerprint(text, locale));

        let cached = match &cache_key {
            Some(key) => self.cache.get(key).await,
            None => None,
        };

        let (raw, tokens, flags) = if let Some(entry) = cached {
            info!(thread_id, user_id, "Serving general question from cache");
            (entry.text, 0, UsageFlags::of(UsageKind::Chat).cache_hit())
        } else {
            let bounded = self.context.assemble(&thread, user_id, &user_message).await?;
            let signals = self.signals(user_id).await;
            let persona = self.behavior.classify_persona(user_id).await;
            let profile = finmentor_security::redact(&self.behavior.user_profile(user_id).await);

            let composed = prompt::compose(PromptInput {
                profile: &profile,
                context: &bounded,
                persona,
                signals: &signals,
                locale,
            });

            let request = ProviderRequest::new(&self.settings.model, composed.text)
                .with_prior_turns(composed.prior_turns)
                .with_temperature(self.settings.temperature)
                .with_max_tokens(self.settings.max_tokens);

            debug!(
                thread_id,
                persona = %persona,
                prior_turns = request.prior_turns.len(),
                summarized = bounded.summarized,
                "Calling provider"
            );

            match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    let tokens = token::call_tokens(&request, &response);
                    (response.text, tokens, UsageFlags::of(UsageKind::Chat))
                }
                Err(e) => {
                    warn!(
                        thread_id,
                        provider = self.provider.name(),
                        timeout = e.is_timeout(),
                        error = %e,
                        "Provider call failed, delivering fallback"
                    );
                    (
                        fallback_reply(locale).to_string(),
                        token::failed_call_tokens(&request),
                        UsageFlags::of(UsageKind::Chat).degraded(),
                    )
                }
            }
        };

        let processed = extract_action_card(&raw);
        let mut metadata = processed.metadata;
        if flags.degraded {
            metadata.insert("degraded".into(), serde_json::Value::Bool(true));
        }

        if let Some(key) = &cache_key {
            if !flags.degraded && !flags.cache_hit {
                self.cache.put(key, &raw).await;
            }
        }

        let assistant = self
            .store
            .append_message(thread_id, Role::Assistant, &processed.text, Some(metadata))
            .await;
        self.record_usage(UsageRecord::new(user_id, Some(thread_id.to_string()), tokens, flags))
            .await;
        let message = assistant?;

        let status = if flags.degraded {
            TurnStatus::Degraded
        } else {
            TurnStatus::Delivered
        };
        info!(
            thread_id,
            user_id,
            status = ?status,
            intent = ?intent,
            cache_hit = flags.cache_hit,
            tokens,
            "Turn complete"
        );

        Ok(AssistantReply {
            message,
            status,
            intent,
            cache_hit: flags.cache_hit,
            tokens,
        })
    }

    // ── Advice ────────────────────────────────────────────────────────────

    /// Structured nudge for the user's next step in a course.
    ///
    /// Never fails on provider or parse errors; those return the localized
    /// fallback advice.
    pub async fn course_advice(
        &self,
        user_id: &str,
        progress: &CourseProgress,
        locale: Locale,
    ) -> Result<AdviceReply, OrchestratorError> {
        let _permit = self.guard.acquire(user_id).await;
        self.guard.check(user_id).await?.into_result()?;

        let signals = self.signals(user_id).await;
        let request = ProviderRequest::new(
            &self.settings.model,
            prompt::compose_advice(progress, &signals, locale),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens);

        let next_step = progress.next_lesson_id.as_deref();
        let (advice, fallback, tokens, flags) = match self.provider.complete(request.clone()).await {
            Ok(response) => {
                let tokens = token::call_tokens(&request, &response);
                let (advice, parsed) =
                    postprocess::parse_structured_advice(&response.text, locale, next_step);
                (advice, !parsed, tokens, UsageFlags::of(UsageKind::Advice))
            }
            Err(e) => {
                warn!(user_id, error = %e, "Advice call failed, using fallback");
                (
                    postprocess::fallback_advice(locale, next_step),
                    true,
                    token::failed_call_tokens(&request),
                    UsageFlags::of(UsageKind::Advice).degraded(),
                )
            }
        };

        self.record_usage(UsageRecord::new(user_id, None, tokens, flags)).await;

        Ok(AdviceReply {
            advice,
            fallback,
            reward: signals.reward,
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    async fn signals(&self, user_id: &str) -> StrategySignals {
        let reward = match &self.reward {
            Some(granter) => granter.maybe_grant(user_id).await,
            None => None,
        };
        StrategySignals {
            churn_risk: self.behavior.predict_churn_risk(user_id).await,
            group_streak: self.behavior.group_streak(user_id).await,
            reward,
        }
    }

    async fn maybe_auto_title(&self, thread: &Thread, first_text: &str) {
        if !thread.title.trim().is_empty() {
            return;
        }
        let title: String = first_text.trim().chars().take(AUTO_TITLE_CHARS).collect();
        if title.is_empty() {
            return;
        }
        if let Err(e) = self.store.rename_thread(&thread.id, &title).await {
            warn!(thread_id = %thread.id, error = %e, "Failed to auto-title thread");
        }
    }

    /// Usage writes after delivery are logged, not surfaced.
    async fn record_usage(&self, record: UsageRecord) {
        let (user_id, tokens) = (record.user_id.clone(), record.tokens);
        if let Err(e) = self.store.write_usage(record).await {
            error!(user_id = %user_id, tokens, error = %e, "Failed to record usage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::StaticBehaviorProvider;
    use crate::test_helpers::{ScriptedProvider, test_behavior};
    use finmentor_core::behavior::Persona;
    use finmentor_core::error::ProviderError;
    use finmentor_store::{InMemoryCache, InMemoryStore};

    struct Harness {
        store: Arc<InMemoryStore>,
        cache: Arc<InMemoryCache>,
        provider: Arc<ScriptedProvider>,
        orchestrator: Orchestrator,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        harness_with(provider, test_behavior())
    }

    fn harness_with(provider: ScriptedProvider, behavior: StaticBehaviorProvider) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryCache::new(3600, 100));
        let provider = Arc::new(provider);
        let orchestrator = Orchestrator::new(
            store.clone(),
            cache.clone(),
            provider.clone(),
            Arc::new(behavior),
        );
        Harness { store, cache, provider, orchestrator }
    }

    async fn seed_usage(store: &InMemoryStore, user_id: &str, count: usize, tokens: u64) {
        for _ in 0..count {
            store
                .write_usage(UsageRecord::new(user_id, None, tokens, UsageFlags::of(UsageKind::Chat)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn personalized_turn_is_delivered_and_recorded() {
        let h = harness(ScriptedProvider::texts(&["Start with a small emergency fund."]));
        let thread = h.orchestrator.create_thread("u1", "Savings", None).await.unwrap();

        let reply = h
            .orchestrator
            .send_message(&thread.id, "u1", "Should I pay off my card first?", Locale::En)
            .await
            .unwrap();

        assert_eq!(reply.status, TurnStatus::Delivered);
        assert_eq!(reply.intent, Intent::PersonalizedAdvice);
        assert_eq!(reply.message.content, "Start with a small emergency fund.");
        assert_eq!(reply.message.metadata["type"], "TEXT");
        assert_eq!(reply.tokens, 15);

        let messages = h.store.list_messages(&thread.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);

        let usage = h.store.usage_records().await;
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].tokens, 15);
        assert_eq!(usage[0].thread_id.as_deref(), Some(thread.id.as_str()));
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn profile_is_redacted_before_the_call() {
        let h = harness(ScriptedProvider::texts(&["ok"]));
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();
        h.orchestrator
            .send_message(&thread.id, "u1", "Plan my month", Locale::En)
            .await
            .unwrap();

        let prompt = &h.provider.requests()[0].prompt;
        assert!(!prompt.contains("lan@example.com"));
        assert!(!prompt.contains("Nguyen Lan"));
        assert!(prompt.contains("***@***.***"));
        assert!(prompt.contains("N***n"));
        assert!(prompt.contains("Plan my month"));
    }

    #[tokio::test]
    async fn missing_or_foreign_thread_is_rejected() {
        let h = harness(ScriptedProvider::texts(&[]));
        let err = h
            .orchestrator
            .send_message("nope", "u1", "hi", Locale::En)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "THREAD_NOT_FOUND");

        let thread = h.orchestrator.create_thread("owner", "t", None).await.unwrap();
        let err = h
            .orchestrator
            .send_message(&thread.id, "intruder", "hi", Locale::En)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Rejected(Rejection::ThreadNotFound(_))));
        assert!(h.store.list_messages(&thread.id).await.unwrap().is_empty());
        assert_eq!(h.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn rate_limited_user_gets_no_call_and_no_record() {
        let h = harness(ScriptedProvider::texts(&[]));
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();
        seed_usage(&h.store, "u1", 20, 1).await;

        let err = h
            .orchestrator
            .send_message(&thread.id, "u1", "hi", Locale::En)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(h.store.usage_len().await, 20);
        assert!(h.store.list_messages(&thread.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_is_rejected() {
        let h = harness(ScriptedProvider::texts(&[]));
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();
        seed_usage(&h.store, "u1", 1, 50_000).await;

        let err = h
            .orchestrator
            .send_message(&thread.id, "u1", "hi", Locale::En)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BUDGET_EXCEEDED");
        assert_eq!(h.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn faq_answer_is_cached_across_threads() {
        let h = harness(ScriptedProvider::texts(&["Interest on interest."]));
        let first = h.orchestrator.create_thread("u1", "a", None).await.unwrap();
        let second = h.orchestrator.create_thread("u2", "b", None).await.unwrap();

        let miss = h
            .orchestrator
            .send_message(&first.id, "u1", "What is compound interest?", Locale::En)
            .await
            .unwrap();
        assert!(!miss.cache_hit);
        assert_eq!(h.cache.len().await, 1);

        let hit = h
            .orchestrator
            .send_message(&second.id, "u2", "  what IS   compound interest? ", Locale::En)
            .await
            .unwrap();
        assert!(hit.cache_hit);
        assert_eq!(hit.tokens, 0);
        assert_eq!(hit.message.content, "Interest on interest.");
        assert_eq!(h.provider.call_count(), 1);

        let usage = h.store.usage_records().await;
        assert_eq!(usage.len(), 2);
        assert!(usage[1].flags.cache_hit);
        assert_eq!(usage[1].user_id, "u2");
    }

    #[tokio::test]
    async fn personalized_questions_never_hit_the_cache() {
        let h = harness(ScriptedProvider::texts(&["first", "second"]));
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();
        for _ in 0..2 {
            let reply = h
                .orchestrator
                .send_message(&thread.id, "u1", "Review my budget", Locale::En)
                .await
                .unwrap();
            assert!(!reply.cache_hit);
        }
        assert_eq!(h.provider.call_count(), 2);
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn provider_failure_degrades_with_localized_fallback() {
        let h = harness(ScriptedProvider::new(vec![Err(ProviderError::Timeout("30s".into()))]));
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();

        let reply = h
            .orchestrator
            .send_message(&thread.id, "u1", "Lãi kép là gì?", Locale::Vi)
            .await
            .unwrap();

        assert_eq!(reply.status, TurnStatus::Degraded);
        assert_eq!(reply.message.content, fallback_reply(Locale::Vi));
        assert_eq!(reply.message.metadata["degraded"], true);
        assert!(h.cache.is_empty().await, "fallbacks are never cached");

        let usage = h.store.usage_records().await;
        assert_eq!(usage.len(), 1);
        assert!(usage[0].flags.degraded);
        assert!(usage[0].tokens > 0);
        assert_eq!(h.store.list_messages(&thread.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn action_card_lands_in_metadata() {
        let h = harness(ScriptedProvider::texts(&[
            "Try this. [ACTION_CARD]{\"type\":\"COURSE_LINK\",\"target\":\"c1\"}[/ACTION_CARD]",
        ]));
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();
        let reply = h
            .orchestrator
            .send_message(&thread.id, "u1", "Where do I start?", Locale::En)
            .await
            .unwrap();

        assert_eq!(reply.message.content, "Try this.");
        assert_eq!(reply.message.metadata["type"], "COURSE_LINK");
        assert_eq!(reply.message.metadata["hasActionCard"], true);
    }

    #[tokio::test]
    async fn empty_title_is_filled_from_first_message() {
        let h = harness(ScriptedProvider::texts(&["ok"]));
        let thread = h.orchestrator.create_thread("u1", "", None).await.unwrap();
        let question = "How should I split my salary between saving, investing and spending each month?";
        h.orchestrator
            .send_message(&thread.id, "u1", question, Locale::En)
            .await
            .unwrap();

        let thread = h.orchestrator.get_thread(&thread.id, "u1").await.unwrap();
        assert_eq!(thread.title.chars().count(), 60);
        assert!(question.starts_with(&thread.title));
    }

    #[tokio::test]
    async fn persona_and_signals_reach_the_prompt() {
        let behavior = StaticBehaviorProvider::new(Persona::SupportiveBuddy)
            .with_churn_risk("u1")
            .with_group_streak("u1", 8);
        let h = harness_with(ScriptedProvider::texts(&["ok"]), behavior);
        let thread = h.orchestrator.create_thread("u1", "t", None).await.unwrap();
        h.orchestrator
            .send_message(&thread.id, "u1", "Keep me going", Locale::Zh)
            .await
            .unwrap();

        let prompt = &h.provider.requests()[0].prompt;
        assert!(prompt.contains("friendly and encouraging peer"));
        assert!(prompt.contains("8-day streak"));
        assert!(prompt.contains("Loss aversion"));
        assert!(prompt.contains("Chinese (zh)"));
    }

    #[tokio::test]
    async fn course_advice_parses_or_falls_back() {
        let h = harness(ScriptedProvider::new(vec![
            Ok("```json\n{\"nudge\":\"So close\",\"trigger\":\"Finish now\"}\n```".into()),
            Ok("I think you should continue".into()),
            Err(ProviderError::EmptyResponse),
        ]));
        let progress = CourseProgress {
            course_title: "Investing basics".into(),
            completed_lessons: 8,
            total_lessons: 10,
            next_lesson_title: Some("ETFs".into()),
            next_lesson_id: Some("l9".into()),
        };

        let parsed = h.orchestrator.course_advice("u1", &progress, Locale::En).await.unwrap();
        assert!(!parsed.fallback);
        assert_eq!(parsed.advice.nudge, "So close");
        assert_eq!(parsed.advice.next_step.as_deref(), Some("l9"));

        let unparsable = h.orchestrator.course_advice("u1", &progress, Locale::En).await.unwrap();
        assert!(unparsable.fallback);
        assert_eq!(unparsable.advice.trigger, "Start your next lesson now");

        let failed = h.orchestrator.course_advice("u1", &progress, Locale::Zh).await.unwrap();
        assert!(failed.fallback);
        assert_eq!(failed.advice.nudge, "继续你的财务成长之旅！");

        let usage = h.store.usage_records().await;
        assert_eq!(usage.len(), 3);
        assert!(usage.iter().all(|r| r.flags.kind == UsageKind::Advice));
        assert!(usage[2].flags.degraded);
        assert!(h.provider.requests()[0].prompt.contains("Goal Gradient"));
    }

    #[tokio::test]
    async fn course_advice_is_guarded() {
        let h = harness(ScriptedProvider::texts(&[]));
        seed_usage(&h.store, "u1", 20, 1).await;
        let progress = CourseProgress {
            course_title: "c".into(),
            completed_lessons: 0,
            total_lessons: 3,
            next_lesson_title: None,
            next_lesson_id: None,
        };
        let err = h
            .orchestrator
            .course_advice("u1", &progress, Locale::En)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn threads_are_listed_per_owner() {
        let h = harness(ScriptedProvider::texts(&["ok"]));
        let older = h.orchestrator.create_thread("u1", "older", None).await.unwrap();
        let newer = h.orchestrator.create_thread("u1", "newer", Some("budgeting")).await.unwrap();
        h.orchestrator.create_thread("u2", "other", None).await.unwrap();

        h.orchestrator
            .send_message(&older.id, "u1", "bump", Locale::En)
            .await
            .unwrap();

        let threads = h.orchestrator.get_threads("u1").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, older.id);
        assert_eq!(threads[1].id, newer.id);

        let err = h.orchestrator.get_messages(&older.id, "u2").await.unwrap_err();
        assert_eq!(err.code(), "THREAD_NOT_FOUND");
    }

    #[tokio::test]
    async fn snapshot_reflects_recorded_usage() {
        let h = harness(ScriptedProvider::texts(&[]));
        seed_usage(&h.store, "u1", 3, 100).await;
        let snapshot = h.orchestrator.usage_snapshot("u1").await.unwrap();
        assert_eq!(snapshot.calls_in_window, 3);
        assert_eq!(snapshot.tokens_this_month, 300);
        assert_eq!(snapshot.remaining_tokens, 49_700);
    }

    #[test]
    fn locale_resolution_uses_default() {
        let h = harness(ScriptedProvider::texts(&[]));
        assert_eq!(h.orchestrator.resolve_locale(None), Locale::Vi);
        assert_eq!(h.orchestrator.resolve_locale(Some("fr")), Locale::Vi);
        assert_eq!(h.orchestrator.resolve_locale(Some("en-US")), Locale::En);
    }
}
