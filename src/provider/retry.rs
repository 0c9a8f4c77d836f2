//! Bounded same-provider retry (supplemented feature, SPEC_FULL §11),
//! grounded directly on `RetryProvider`/`RetryConfig` as exercised by
//! `tests/provider_chaos.rs` in the teacher's own test suite: a decorator
//! distinct from cross-provider fallback (module C), answering "how many
//! times to retry this one provider" rather than "which provider next".

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{ProviderRequest, ProviderResult};
use crate::error::ProviderError;
use crate::provider::Provider;

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryConfig {
    pub max_retries: u32,
}

pub struct RetryProvider<P: Provider + ?Sized> {
    inner: Arc<P>,
    config: RetryConfig,
}

impl<P: Provider + ?Sized> RetryProvider<P> {
    pub fn new(inner: Arc<P>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for RetryProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderResult, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.execute(request.clone()).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < self.config.max_retries => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_with_tools(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResult, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.execute_with_tools(request.clone()).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < self.config.max_retries => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StopReason;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flakey {
        failures_remaining: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for Flakey {
        fn name(&self) -> &str {
            "flakey"
        }

        async fn execute(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let prev = self.failures_remaining.load(Ordering::Relaxed);
            if prev > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::Relaxed);
                return Err(ProviderError::RequestFailed {
                    provider: "flakey".into(),
                    reason: "timed out".into(),
                });
            }
            Ok(ProviderResult {
                output: "recovered".into(),
                stop_reason: StopReason::EndTurn,
                tool_calls: vec![],
                tokens_in: 1,
                tokens_out: 1,
                cost_usd: Decimal::ZERO,
            })
        }

        async fn execute_with_tools(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResult, ProviderError> {
            self.execute(request).await
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            prompt: "hi".into(),
            system_prompt: None,
            messages: vec![],
            tool_defs: vec![],
            model: None,
            token_hint: None,
            cost_hint: None,
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let flakey = Arc::new(Flakey {
            failures_remaining: AtomicU32::new(3),
            calls: AtomicU32::new(0),
        });
        let retry = RetryProvider::new(flakey.clone(), RetryConfig { max_retries: 5 });

        let result = retry.execute(request()).await.expect("should recover");
        assert_eq!(result.output, "recovered");
        assert_eq!(flakey.calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_error() {
        let flakey = Arc::new(Flakey {
            failures_remaining: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let retry = RetryProvider::new(flakey.clone(), RetryConfig { max_retries: 2 });

        let result = retry.execute(request()).await;
        assert!(result.is_err());
        assert_eq!(flakey.calls.load(Ordering::Relaxed), 3);
    }
}
