use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry strategy for dependencies the worker cannot start without
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay after the given failed attempt (0-based), doubling up to `max_delay`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Run `operation` until it succeeds or the policy runs out of attempts.
///
/// The last error is returned when attempts are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => {
                if attempts > 1 {
                    info!("{} succeeded after {} attempts", what, attempts);
                }
                return Ok(value);
            }
            Err(error) => {
                if policy.exhausted(attempts) {
                    warn!("{} failed after {} attempts: {}", what, attempts, error);
                    return Err(error);
                }

                let delay = policy.delay_for(attempts - 1);
                warn!("{} failed (attempt {}): {}", what, attempts, error);
                debug!("Waiting {:?} before retrying {}", delay, what);
                sleep(delay).await;
            }
        }
    }
}
