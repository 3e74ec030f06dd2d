use anyhow::{Error, Result, anyhow};
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::utils::strip_html;

pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential: 2.0,
        }
    }
}

impl RetryConfig {
    // Exponential backoff with full jitter
    // https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/
    pub fn next_delay(&self, delay_ms: u64) -> u64 {
        let next_delay = delay_ms as f64 * self.exponential;
        std::cmp::min(self.max_delay_ms, (fastrand::f64() * next_delay) as u64)
    }
}

/// Retries a fallible startup call. Long-running loops retry whole passes instead and
/// do not go through this helper.
pub async fn retry<F, Fut, T>(operation: F, config: &RetryConfig, context: &str) -> Result<T, Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, Error>>,
{
    let mut attempt = 1;
    let mut delay = config.base_delay_ms;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        "Operation '{}' failed after {} attempts. Final error: {}",
                        context, attempt, e
                    );
                    return Err(anyhow!(strip_html(&e.to_string()))
                        .context(format!("Failed after {} attempts", attempt)));
                }

                warn!(
                    "Attempt {}/{} for '{}' failed: {}. Retrying in {}ms...",
                    attempt,
                    config.max_attempts,
                    context,
                    strip_html(&e.to_string()),
                    delay
                );

                sleep(Duration::from_millis(delay)).await;

                delay = config.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
