use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheError;
use crate::config::RetrySettings;

/// Retry-after-delay for cached loads.
///
/// The cache itself never retries; views re-issue the load here after a
/// short pause. Authorization failures are returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay: Duration::from_secs(1),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.attempts, settings.delay)
    }
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn run<T, F, Fut>(&self, resource: &str, mut load: F) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut retried = 0;
        loop {
            match load().await {
                Ok(value) => return Ok(value),
                Err(err) if retried < self.attempts && err.is_retryable() => {
                    retried += 1;
                    warn!(
                        resource,
                        attempt = retried,
                        delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Load failed, retrying after delay"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
