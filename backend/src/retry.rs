use ring::rand::{SecureRandom, SystemRandom};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Errors that may succeed when the same operation is attempted again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Capped exponential backoff with additive jitter. Attempt `n` (zero-based)
/// waits `min(base * 2^n, max_delay)` plus a random slice of `max_jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut bytes = [0u8; 8];
        match SystemRandom::new().fill(&mut bytes) {
            Ok(()) => Duration::from_millis(u64::from_le_bytes(bytes) % max_ms),
            Err(_) => Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + self.jitter()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{operation} failed after {attempts} attempts: {error}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        error: E,
    },
    #[error("{operation} failed: {error}")]
    Permanent { operation: &'static str, error: E },
}

impl<E> RetryError<E> {
    pub fn operation(&self) -> &'static str {
        match self {
            RetryError::Exhausted { operation, .. } | RetryError::Permanent { operation, .. } => operation,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { error, .. } | RetryError::Permanent { error, .. } => error,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempts = attempt + 1, "succeeded after retrying");
                }
                return Ok(value);
            }
            Err(error) if !error.is_transient() => {
                error!(operation, %error, "operation failed, not retrying");
                return Err(RetryError::Permanent { operation, error });
            }
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(operation, attempts = attempt, %error, "max retries reached, operation failed");
                    return Err(RetryError::Exhausted { operation, attempts: attempt, error });
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(operation, attempt, delay_ms = delay.as_millis() as u64, %error, "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
