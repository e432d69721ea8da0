use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::GenerationConfig;
use crate::{RagError, Result};

/// Fixed-delay retry: up to `max_attempts` tries, waiting `delay` between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// What happened during one retried operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: String,
        will_retry: bool,
    },
    Recovered {
        attempt: u32,
    },
    Exhausted {
        attempts: u32,
        last_error: String,
    },
}

/// Receives retry events; kept separate from the retry loop itself
pub trait RetryObserver: Send + Sync {
    fn on_event(&self, event: &RetryEvent);
}

/// Default observer: reports events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    #[inline]
    fn on_event(&self, event: &RetryEvent) {
        match event {
            RetryEvent::AttemptFailed {
                attempt,
                max_attempts,
                error,
                will_retry,
            } => warn!(
                attempt,
                max_attempts,
                will_retry,
                "Generation attempt failed: {}",
                error
            ),
            RetryEvent::Recovered { attempt } => {
                debug!(attempt, "Generation succeeded after retry");
            }
            RetryEvent::Exhausted {
                attempts,
                last_error,
            } => error!(attempts, "All generation attempts failed: {}", last_error),
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. Exhaustion yields
    /// [`RagError::BackendUnavailable`] carrying the last failure.
    #[inline]
    pub async fn run<T, F, Fut>(&self, observer: &dyn RetryObserver, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        observer.on_event(&RetryEvent::Recovered { attempt });
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let will_retry = attempt < max_attempts;
                    last_error = e.to_string();
                    observer.on_event(&RetryEvent::AttemptFailed {
                        attempt,
                        max_attempts,
                        error: last_error.clone(),
                        will_retry,
                    });

                    if will_retry {
                        sleep(self.delay).await;
                    }
                }
            }
        }

        observer.on_event(&RetryEvent::Exhausted {
            attempts: max_attempts,
            last_error: last_error.clone(),
        });
        Err(RagError::BackendUnavailable(last_error))
    }
}
