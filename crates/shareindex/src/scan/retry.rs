use std::future::Future;

use crate::config::RetryPolicy;
use crate::error::Result;

/// Runs `operation` until it succeeds, fails permanently, or `policy` runs
/// out of attempts. Only transient errors are retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "share call failed op={} attempt={}/{} retry_in_ms={} error={}",
                    what,
                    attempt,
                    attempts,
                    delay.as_millis(),
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
