//! Bounded exponential backoff for provider calls

use crate::config::RetryConfig;
use crate::error::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Where a provider runs; decides whether its calls are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Network-backed, subject to rate limits and transient failures
    Remote,
    /// Synchronous, in the current process
    InProcess,
}

impl Deployment {
    /// Policy a gateway applies to a provider deployed this way
    pub fn policy(self, remote: &RetryPolicy) -> RetryPolicy {
        match self {
            Deployment::Remote => remote.clone(),
            Deployment::InProcess => RetryPolicy::none(),
        }
    }
}

/// Retry policy shared by the embedding and summarizer gateways
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (0-based), capped at the maximum backoff
    pub fn compute_delay(&self, retry: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64) as u64;
        let jitter = if self.jitter && !self.initial_backoff.is_zero() {
            rand::thread_rng().gen_range(0..=self.initial_backoff.as_millis() as u64)
        } else {
            0
        };
        Duration::from_millis(capped) + Duration::from_millis(jitter).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    error!("{} failed permanently: {}", operation, e);
                    return Err(e);
                }
                Err(e) if attempts < self.max_attempts => {
                    let backoff = self.compute_delay(attempts - 1);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        operation, attempts, self.max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!("{} failed after {} attempts: {}", operation, attempts, e);
                    return Err(ProviderError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        last: Box::new(e),
                    });
                }
            }
        }
    }
}
