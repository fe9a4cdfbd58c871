//! Data model for guard limits, decisions, and usage snapshots.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use finmentor_config::GuardConfig;
use finmentor_core::Rejection;
use serde::{Deserialize, Serialize};

// ── Limits ────────────────────────────────────────────────────────────────

/// Ceilings enforced per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardLimits {
    /// Calls allowed inside one sliding window.
    pub max_calls_per_window: u64,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Tokens allowed per calendar month (UTC).
    pub monthly_token_budget: u64,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self::from(&GuardConfig::default())
    }
}

impl From<&GuardConfig> for GuardLimits {
    fn from(config: &GuardConfig) -> Self {
        Self {
            max_calls_per_window: config.max_calls_per_window,
            window_secs: config.window_secs,
            monthly_token_budget: config.monthly_token_budget,
        }
    }
}

impl GuardLimits {
    /// Start of the sliding window ending at `now`.
    ///
    /// A window reaching past the representable range starts at the
    /// earliest instant, so every record counts.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// First instant of the calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

// ── Decisions ─────────────────────────────────────────────────────────────

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Denied(Rejection),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Convert into a `Result`, turning a denial into its rejection.
    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(rejection) => Err(rejection),
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────

/// Point-in-time view of a user's consumption against the limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub user_id: String,
    /// Records inside the current sliding window.
    pub calls_in_window: u64,
    pub max_calls_per_window: u64,
    pub window_secs: u64,
    /// Tokens recorded since the start of the month.
    pub tokens_this_month: u64,
    pub monthly_token_budget: u64,
    pub remaining_tokens: u64,
    pub rate_limited: bool,
    pub budget_exhausted: bool,
    pub taken_at: DateTime<Utc>,
}
