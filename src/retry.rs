use crate::{EmsError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Backoff schedule for operations that may fail transiently.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_delays(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Waiting for a server that is still starting up.
    pub fn server_pipe() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 1.5,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Runs `operation` until it succeeds, fails with an error that retrying
/// cannot fix, or `max_attempts` is reached.
///
/// Only transport failures are retried: a server pipe that does not exist
/// yet is expected while the server starts up.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "{} succeeded after retrying", operation_name);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !matches!(error, EmsError::TransportFailure(_)) {
            return Err(error);
        }
        if attempt >= config.max_attempts {
            error!(attempts = attempt, "{} failed: {}", operation_name, error);
            return Err(error);
        }

        let delay = config.backoff(attempt);
        warn!(attempt, ?delay, "{} failed ({}), retrying", operation_name, error);
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::with_delays(5, Duration::from_millis(10), Duration::from_millis(40));

        let value = retry_with_backoff(&config, "flaky", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(EmsError::TransportFailure("not yet".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::new(2);

        let result: Result<()> = retry_with_backoff(&config, "broken", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EmsError::TransportFailure("down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(EmsError::TransportFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_grows_until_capped() {
        let config = RetryConfig::with_delays(10, Duration::from_millis(125), Duration::from_secs(1));
        assert_eq!(config.backoff(1), Duration::from_millis(125));
        assert_eq!(config.backoff(2), Duration::from_millis(250));
        assert_eq!(config.backoff(3), Duration::from_millis(500));
        assert_eq!(config.backoff(40), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_request_errors() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(&RetryConfig::new(5), "lookup", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EmsError::NotFound(1)) }
        })
        .await;

        assert!(matches!(result, Err(EmsError::NotFound(1))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
