//! Usage accounting and limit enforcement for FinMentor.
//!
//! Provides the per-user rate and budget guard that every external call
//! passes through, plus usage snapshots for reporting. All aggregates are
//! rebuilt from the usage ledger in the store; nothing is kept in memory
//! across requests.

pub mod guard;
pub mod model;

pub use guard::{RateBudgetGuard, UserPermit};
pub use model::{GuardDecision, GuardLimits, UsageSnapshot, month_start};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("usage ledger unavailable: {0}")]
    Store(#[from] finmentor_core::StoreError),
}
