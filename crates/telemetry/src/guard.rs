//! Rate and budget guard: per-user sliding-window call limit plus a
//! calendar-month token budget, both rebuilt from the usage ledger.
//!
//! The guard never writes. The orchestrator records usage after each call
//! attempt; between the check and that write, two concurrent requests from
//! one user can both pass. Enable per-user serialization to close that gap.

use crate::TelemetryError;
use crate::model::{GuardDecision, GuardLimits, UsageSnapshot, month_start};
use chrono::{DateTime, Utc};
use finmentor_core::{Rejection, Store};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// The rate and budget guard.
pub struct RateBudgetGuard {
    store: Arc<dyn Store>,
    limits: GuardLimits,
    /// Present when check-and-record is serialized per user.
    user_locks: Option<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Held for the duration of one guarded unit of work.
pub type UserPermit = OwnedMutexGuard<()>;

impl RateBudgetGuard {
    pub fn new(store: Arc<dyn Store>, limits: GuardLimits) -> Self {
        Self {
            store,
            limits,
            user_locks: None,
        }
    }

    /// Serialize guarded work per user (check, call, and usage write).
    pub fn with_serialization(mut self, enabled: bool) -> Self {
        self.user_locks = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn limits(&self) -> &GuardLimits {
        &self.limits
    }

    /// Acquire the user's permit when serialization is enabled.
    ///
    /// Hold the returned permit until the usage record is written.
    pub async fn acquire(&self, user_id: &str) -> Option<UserPermit> {
        let locks = self.user_locks.as_ref()?;
        let lock = {
            let mut map = locks.lock().await;
            // Drop entries nobody is holding or waiting on.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Some(lock.lock_owned().await)
    }

    /// Check both limits for `user_id` as of now.
    pub async fn check(&self, user_id: &str) -> Result<GuardDecision, TelemetryError> {
        self.check_at(user_id, Utc::now()).await
    }

    /// Check both limits for `user_id` as of `now`.
    ///
    /// Both aggregates are always evaluated; when both are over, the rate
    /// limit is reported.
    pub async fn check_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, TelemetryError> {
        let calls = self
            .store
            .count_usage(user_id, self.limits.window_start(now))
            .await?;
        let tokens = self.store.sum_tokens(user_id, month_start(now)).await?;

        debug!(
            user_id,
            calls,
            tokens,
            max_calls = self.limits.max_calls_per_window,
            budget = self.limits.monthly_token_budget,
            "Guard check"
        );

        if calls >= self.limits.max_calls_per_window {
            warn!(user_id, calls, window_secs = self.limits.window_secs, "Rate limit exceeded");
            return Ok(GuardDecision::Denied(Rejection::RateLimitExceeded {
                calls,
                window_secs: self.limits.window_secs,
            }));
        }

        if tokens >= self.limits.monthly_token_budget {
            warn!(user_id, tokens, budget = self.limits.monthly_token_budget, "Monthly token budget exhausted");
            return Ok(GuardDecision::Denied(Rejection::BudgetExceeded {
                used: tokens,
                budget: self.limits.monthly_token_budget,
            }));
        }

        Ok(GuardDecision::Allowed)
    }

    /// Report a user's consumption against the limits.
    pub async fn snapshot(&self, user_id: &str) -> Result<UsageSnapshot, TelemetryError> {
        let now = Utc::now();
        let calls = self
            .store
            .count_usage(user_id, self.limits.window_start(now))
            .await?;
        let tokens = self.store.sum_tokens(user_id, month_start(now)).await?;

        Ok(UsageSnapshot {
            user_id: user_id.to_string(),
            calls_in_window: calls,
            max_calls_per_window: self.limits.max_calls_per_window,
            window_secs: self.limits.window_secs,
            tokens_this_month: tokens,
            monthly_token_budget: self.limits.monthly_token_budget,
            remaining_tokens: self.limits.monthly_token_budget.saturating_sub(tokens),
            rate_limited: calls >= self.limits.max_calls_per_window,
            budget_exhausted: tokens >= self.limits.monthly_token_budget,
            taken_at: now,
        })
    }
}
