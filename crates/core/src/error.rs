//! Error types for the FinMentor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.
//!
//! None of these messages may carry user-supplied text or profile values:
//! variants hold ids, status codes, and short reasons only.

use thiserror::Error;

// --- Bounded context errors ---

/// Why an inbound message was turned away before any external call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("rate limit exceeded: {calls} calls in the last {window_secs}s")]
    RateLimitExceeded { calls: u64, window_secs: u64 },

    #[error("monthly token budget exhausted: {used} of {budget} tokens")]
    BudgetExceeded { used: u64, budget: u64 },

    #[error("thread not found: {0}")]
    ThreadNotFound(String),
}

impl Rejection {
    /// Stable machine-readable code for transports and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::ThreadNotFound(_) => "THREAD_NOT_FOUND",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned no usable text")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether this failure was a timeout rather than a provider-side error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),
}
