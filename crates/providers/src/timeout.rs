//! Timeout wrapper: bounds every external call.
//!
//! An elapsed timeout is reported as `ProviderError::Timeout`, which callers
//! treat like any other failed call. There is no retry.

use async_trait::async_trait;
use finmentor_core::error::ProviderError;
use finmentor_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A provider that fails any call exceeding `timeout`.
pub struct TimeoutProvider {
    inner: Arc<dyn Provider>,
    timeout: Duration,
}

impl TimeoutProvider {
    pub fn new(inner: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Provider for TimeoutProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    provider = %self.inner.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Provider call timed out"
                );
                Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}ms",
                    self.inner.name(),
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
