//! Bounded retry with exponential backoff for transient backend failures.

use std::{fmt::Display, future::Future, time::Duration};

use tracing::warn;

use crate::server_config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` up to `1 + max_retries` times. On each failure
    /// `is_transient` decides whether another attempt is worthwhile;
    /// non-transient errors are returned immediately. The delay doubles
    /// after every retry, capped at `max_backoff`.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        description: &str,
        mut attempt: F,
        mut is_transient: R,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: FnMut(&E) -> bool,
    {
        let mut delay = self.initial_backoff;
        for attempt_no in 0..=self.max_retries {
            match attempt().await {
                Ok(val) => return Ok(val),
                Err(e) => {
                    if !is_transient(&e) || attempt_no == self.max_retries {
                        return Err(e);
                    }
                    warn!(
                        attempt = attempt_no + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        description,
                        error = %e,
                        "transient failure, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.max_backoff);
                }
            }
        }
        unreachable!("loop returns on the final attempt")
    }
}
