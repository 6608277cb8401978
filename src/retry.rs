//! Exponential backoff with jitter, classifying on
//! [`GatewayError::is_retryable`] and exposing the engine's narrower
//! "retry once on a buffered request" policy.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);
        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);
        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Retries unconditionally up to `config.max_attempts`, sleeping with
/// exponential backoff between attempts.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GatewayError::server_error("retry failed with no error")))
}

/// Like [`retry_with_backoff`], but stops immediately on a non-retryable
/// [`GatewayError`]: `invalid_request`/`not_found`/`too_many_requests`
/// never warrant a retry.
pub async fn retry_with_backoff_conditional<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                last_error = Some(err);
                if attempt < config.max_attempts - 1 {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GatewayError::server_error("retry failed with no error")))
}

/// The engine's buffered-request retry policy: at most one retry, only for
/// a retryable error, only ever called before any response byte has been
/// written.
pub async fn retry_once_buffered<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff_conditional(RetryConfig::default().with_max_attempts(2), operation).await
}
