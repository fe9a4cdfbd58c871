//! End-to-end integration tests for the FinMentor orchestration pipeline.
//!
//! These tests drive the orchestrator with an in-memory store and cache and a
//! scripted provider, covering guard rejections, caching, summarization and
//! degraded turns across several messages.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use finmentor_agent::{Intent, Orchestrator, StaticBehaviorProvider, TurnStatus};
use finmentor_core::behavior::Persona;
use finmentor_core::cache::ResponseCache;
use finmentor_core::error::ProviderError;
use finmentor_core::locale::Locale;
use finmentor_core::message::Role;
use finmentor_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use finmentor_core::store::Store;
use finmentor_core::usage::UsageKind;
use finmentor_store::{InMemoryCache, InMemoryStore, fingerprint};
use finmentor_telemetry::GuardLimits;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted outcomes in sequence, then repeats
/// `fallback` (if any).
struct ScriptedProvider {
    outcomes: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<String>,
    tokens: u32,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(outcomes: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback: None,
            tokens: 15,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn repeating(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new(vec![])
        }
    }

    fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = tokens;
        self
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.outcomes.lock().unwrap().pop_front();
        let text = match next {
            Some(outcome) => outcome?,
            None => self
                .fallback
                .clone()
                .expect("ScriptedProvider: no more outcomes"),
        };
        Ok(ProviderResponse {
            text,
            usage: Some(Usage {
                prompt_tokens: self.tokens.saturating_sub(5),
                completion_tokens: 5u32.min(self.tokens),
                total_tokens: self.tokens,
            }),
            model: request.model,
        })
    }
}

struct Setup {
    store: Arc<InMemoryStore>,
    cache: Arc<InMemoryCache>,
    provider: Arc<ScriptedProvider>,
    orchestrator: Arc<Orchestrator>,
}

fn setup(provider: ScriptedProvider) -> Setup {
    setup_with(provider, |o| o)
}

fn setup_with(provider: ScriptedProvider, configure: impl FnOnce(Orchestrator) -> Orchestrator) -> Setup {
    let store = Arc::new(InMemoryStore::new());
    let cache = Arc::new(InMemoryCache::new(86_400, 1_000));
    let provider = Arc::new(provider);
    let behavior = StaticBehaviorProvider::new(Persona::WiseSage).with_profile(
        "alice",
        serde_json::json!({
            "displayName": "Alice Nguyen",
            "email": "alice@example.com",
            "investmentProfile": { "risk": "LOW" }
        }),
    );
    let orchestrator = Orchestrator::new(store.clone(), cache.clone(), provider.clone(), Arc::new(behavior));
    Setup {
        store,
        cache,
        provider,
        orchestrator: Arc::new(configure(orchestrator)),
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_faq_is_cached_across_threads_and_still_logged() {
    let s = setup(ScriptedProvider::new(vec![Ok(
        "Compound interest is interest earned on interest.".into(),
    )]));

    let first = s.orchestrator.create_thread("alice", "", None).await.unwrap();
    let reply = s
        .orchestrator
        .send_message(&first.id, "alice", "What is compound interest?", Locale::En)
        .await
        .unwrap();
    assert_eq!(reply.intent, Intent::GeneralFaq);
    assert!(!reply.cache_hit);
    assert_eq!(s.cache.len().await, 1);
    let key = fingerprint("what is compound interest?", Locale::En);
    assert!(s.cache.get(&key).await.is_some());

    let second = s.orchestrator.create_thread("bob", "Basics", None).await.unwrap();
    let reply = s
        .orchestrator
        .send_message(&second.id, "bob", "  WHAT is   compound interest?\n", Locale::En)
        .await
        .unwrap();
    assert!(reply.cache_hit);
    assert_eq!(reply.status, TurnStatus::Delivered);
    assert_eq!(reply.message.content, "Compound interest is interest earned on interest.");
    assert_eq!(s.provider.calls(), 1, "no second external call");

    let usage = s.store.usage_records().await;
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[1].user_id, "bob");
    assert!(usage[1].flags.cache_hit);

    // Both threads hold the question and the answer.
    for thread in [&first, &second] {
        let messages = s.store.list_messages(&thread.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    // The untitled thread was titled from its first message.
    let titled = s.orchestrator.get_thread(&first.id, "alice").await.unwrap();
    assert_eq!(titled.title, "What is compound interest?");
}

#[tokio::test]
async fn e2e_twenty_calls_then_rate_limited() {
    let s = setup(ScriptedProvider::repeating("Keep a budget."));

    for i in 0..20 {
        let thread = s.orchestrator.create_thread("alice", &format!("t{i}"), None).await.unwrap();
        s.orchestrator
            .send_message(&thread.id, "alice", "Review my spending", Locale::En)
            .await
            .unwrap();
    }

    let thread = s.orchestrator.create_thread("alice", "one more", None).await.unwrap();
    let err = s
        .orchestrator
        .send_message(&thread.id, "alice", "Review my spending", Locale::En)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
    assert_eq!(s.provider.calls(), 20);
    assert!(s.store.list_messages(&thread.id).await.unwrap().is_empty());

    // Other users are unaffected.
    let other = s.orchestrator.create_thread("bob", "mine", None).await.unwrap();
    assert!(s
        .orchestrator
        .send_message(&other.id, "bob", "Review my spending", Locale::En)
        .await
        .is_ok());
}

#[tokio::test]
async fn e2e_monthly_budget_exhaustion() {
    let s = setup(ScriptedProvider::repeating("ok").with_tokens(25_000));
    let thread = s.orchestrator.create_thread("alice", "t", None).await.unwrap();

    for _ in 0..2 {
        s.orchestrator
            .send_message(&thread.id, "alice", "Plan my savings", Locale::En)
            .await
            .unwrap();
    }

    let err = s
        .orchestrator
        .send_message(&thread.id, "alice", "Plan my savings", Locale::En)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BUDGET_EXCEEDED");
    assert_eq!(s.provider.calls(), 2);

    let snapshot = s.orchestrator.usage_snapshot("alice").await.unwrap();
    assert!(snapshot.budget_exhausted);
    assert_eq!(snapshot.remaining_tokens, 0);
}

#[tokio::test]
async fn e2e_long_thread_is_summarized_before_the_call() {
    let s = setup(ScriptedProvider::new(vec![
        Ok("Alice wants to build an emergency fund.".into()),
        Ok("Automate a monthly transfer.".into()),
    ]));
    let thread = s.orchestrator.create_thread("alice", "Savings", None).await.unwrap();
    for i in 0..13 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        s.store
            .append_message(&thread.id, role, &format!("turn {i}"), None)
            .await
            .unwrap();
    }

    let reply = s
        .orchestrator
        .send_message(&thread.id, "alice", "Where should I keep it?", Locale::En)
        .await
        .unwrap();
    assert_eq!(reply.message.content, "Automate a monthly transfer.");

    let requests = s.provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].prompt.contains("turn 0"));
    assert!(requests[0].prompt.contains("turn 4"));

    let main = &requests[1];
    assert!(main.prompt.contains("PREVIOUS CONVERSATION SUMMARY: Alice wants to build an emergency fund."));
    assert_eq!(main.prior_turns.len(), 8);
    let verbatim: Vec<&str> = main.prior_turns.iter().map(|t| t.content.as_str()).collect();
    for evicted in ["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"] {
        assert!(!verbatim.contains(&evicted));
    }
    assert_eq!(verbatim[0], "turn 5");

    // The summary is cached on the thread.
    let stored = s.orchestrator.get_thread(&thread.id, "alice").await.unwrap();
    assert_eq!(stored.summary.unwrap().covered_messages, 5);

    let kinds: Vec<UsageKind> = s.store.usage_records().await.iter().map(|r| r.flags.kind).collect();
    assert_eq!(kinds, vec![UsageKind::Summary, UsageKind::Chat]);
}

#[tokio::test]
async fn e2e_degraded_turn_then_recovery() {
    let s = setup(ScriptedProvider::new(vec![
        Err(ProviderError::Timeout("30s".into())),
        Ok("Here is the answer. [ACTION_CARD]{\"type\":\"QUIZ\",\"target\":\"q1\"}[/ACTION_CARD]".into()),
    ]));
    let thread = s.orchestrator.create_thread("alice", "t", None).await.unwrap();

    let degraded = s
        .orchestrator
        .send_message(&thread.id, "alice", "What is an ETF?", Locale::Zh)
        .await
        .unwrap();
    assert_eq!(degraded.status, TurnStatus::Degraded);
    assert_eq!(degraded.message.content, "抱歉，AI 导师暂时无法使用，请稍后再试。");
    assert!(s.cache.is_empty().await);

    let recovered = s
        .orchestrator
        .send_message(&thread.id, "alice", "What is an ETF?", Locale::Zh)
        .await
        .unwrap();
    assert_eq!(recovered.status, TurnStatus::Delivered);
    assert!(!recovered.cache_hit);
    assert_eq!(recovered.message.content, "Here is the answer.");
    assert_eq!(recovered.message.metadata["hasActionCard"], true);
    assert_eq!(recovered.message.metadata["type"], "QUIZ");
    assert_eq!(s.cache.len().await, 1);

    // The failed attempt was charged and flagged.
    let usage = s.store.usage_records().await;
    assert_eq!(usage.len(), 2);
    assert!(usage[0].flags.degraded);
    assert!(!usage[1].flags.degraded);

    // The degraded exchange stays in the history the second call saw.
    let second_call = &s.provider.requests()[1];
    assert_eq!(second_call.prior_turns.len(), 2);
}

#[tokio::test]
async fn e2e_pii_never_reaches_the_provider() {
    let s = setup(ScriptedProvider::repeating("ok"));
    let thread = s.orchestrator.create_thread("alice", "t", None).await.unwrap();
    s.orchestrator
        .send_message(&thread.id, "alice", "How am I doing?", Locale::Vi)
        .await
        .unwrap();

    let request = &s.provider.requests()[0];
    assert!(!request.prompt.contains("alice@example.com"));
    assert!(!request.prompt.contains("Alice Nguyen"));
    assert!(request.prompt.contains("A***n"));
    assert!(request.prompt.contains("\"risk\":\"LOW\""));
    assert!(request.prompt.contains("seasons and nature"));
    assert!(request.prompt.contains("Always respond in Vietnamese"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_serialized_guard_holds_under_concurrency() {
    let s = setup_with(ScriptedProvider::repeating("ok"), |o| {
        o.with_limits(
            GuardLimits {
                max_calls_per_window: 5,
                window_secs: 60,
                monthly_token_budget: 50_000,
            },
            true,
        )
    });

    let mut threads = Vec::new();
    for i in 0..12 {
        threads.push(s.orchestrator.create_thread("alice", &format!("t{i}"), None).await.unwrap());
    }

    let mut handles = Vec::new();
    for thread in threads {
        let orchestrator = s.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .send_message(&thread.id, "alice", "Review my spending", Locale::En)
                .await
        }));
    }

    let mut delivered = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => delivered += 1,
            Err(e) => {
                assert_eq!(e.code(), "RATE_LIMIT_EXCEEDED");
                rejected += 1;
            }
        }
    }

    assert_eq!(delivered, 5);
    assert_eq!(rejected, 7);
    assert_eq!(s.provider.calls(), 5);
    assert_eq!(s.store.usage_len().await, 5);
}
