//! Retry logic with exponential backoff and jitter for agent calls.

use std::time::Duration;

use rand::Rng;

use storyloom_types::{OrchestratorError, Result};

/// Backoff configuration shared (read-only) across concurrent calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the first attempt; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Multiply each delay by a uniform factor in `[0.5, 1.0)`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A config that never sleeps, for tests and tight loops.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    /// Delay before attempt `attempt` (0-indexed). Attempt 0 has no delay;
    /// attempt `i >= 1` waits `min(base * exponential_base^(i-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self.exponential_base.powi((attempt - 1) as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter && delay > Duration::ZERO {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..1.0))
        } else {
            delay
        }
    }
}

/// Execute an operation with retry and backoff.
///
/// The closure `f` is called up to `config.max_retries + 1` times; any error
/// triggers another attempt until the budget runs out. Each failed attempt
/// logs a warning with the attempt index and the computed delay. On
/// exhaustion, fails with [`OrchestratorError::RetriesExhausted`] wrapping
/// the last underlying error.
///
/// The engine holds no shared state and is safe for unlimited concurrent use.
pub async fn execute_with_retry<F, Fut, T>(
    f: F,
    config: &RetryConfig,
    operation: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries => {
                let delay = config.jittered(config.delay_for_attempt(attempt + 1));
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off"
                );
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!(operation, attempt, error = %e, "Final attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(OrchestratorError::RetriesExhausted {
        operation: operation.to_string(),
        attempts: config.max_retries + 1,
        source: Box::new(
            last_err.unwrap_or_else(|| OrchestratorError::Other("no attempts were made".into())),
        ),
    })
}
