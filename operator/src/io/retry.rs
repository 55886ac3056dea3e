//! Bounded retry with exponential backoff for transient API failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::io::api::ApiError;
use crate::io::config::RetryConfig;

/// Retry schedule derived from [`RetryConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    /// No retries: a single failure is final.
    pub fn none() -> Self {
        Self::from(&RetryConfig::default())
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt).as_millis() as f64;
        let spread = base * self.jitter_factor;
        if spread < 1.0 {
            return Duration::from_millis(base as u64);
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((base + offset).max(0.0) as u64)
    }

    /// Run `op`, retrying retryable errors until the budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.run_if(what, ApiError::is_retryable, op).await
    }

    /// Run `op`, retrying errors accepted by `retryable` until the budget is spent.
    pub async fn run_if<T, F, Fut>(
        &self,
        what: &str,
        retryable: fn(&ApiError) -> bool,
        mut op: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if retryable(&err) && attempt < self.max_retries => {
                    let delay = self.jittered(attempt);
                    warn!(
                        call = what,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_factor: cfg.jitter_factor,
        }
    }
}
