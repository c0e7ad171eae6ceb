//! Retry loop shared by every registry operation.
//!
//! Each attempt acquires a stub from the [`ConnectionManager`] and runs the
//! operation against it. Errors that indicate a broken connection poison it
//! before the next attempt; transient errors are retried with exponential
//! backoff until the caller's deadline runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::debug;

use crate::error::{Error, Result};
use crate::infrastructure::config::retry::RetryConfig;
use crate::infrastructure::connection::ConnectionManager;
use crate::port::RegistryStub;

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    current_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
}

impl Backoff {
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.backoff_multiplier,
        }
    }

    /// Return the current delay and advance the internal delay state for
    /// the next call.
    pub fn next_delay(&mut self) -> Duration {
        let base_delay = Duration::from_millis(self.current_delay_ms);
        let delay = base_delay + Duration::from_millis(Self::jitter_ms(base_delay));

        let next_delay = (self.current_delay_ms as f64 * self.multiplier) as u64;
        self.current_delay_ms = next_delay.min(self.max_delay_ms);

        delay
    }

    /// Up to 20% random jitter so that clients failing together do not
    /// retry together.
    fn jitter_ms(base_delay: Duration) -> u64 {
        let jitter_range_ms = (base_delay.as_millis() as u64) / 5;
        if jitter_range_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=jitter_range_ms)
    }
}

/// Runs registry operations with connection reuse, poisoning, and retry.
#[derive(Clone)]
pub struct RetryExecutor {
    connections: Arc<ConnectionManager>,
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(connections: Arc<ConnectionManager>, config: RetryConfig) -> Self {
        Self {
            connections,
            config,
        }
    }

    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Run `op` until it succeeds, fails permanently, or `deadline` passes.
    ///
    /// `op` is called once per attempt with a live stub. With a deadline,
    /// every attempt (dial included) is cut off at the deadline and reports
    /// [`Error::DeadlineExceeded`]. Without one, retryable errors are
    /// retried indefinitely.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last retryable error
    /// once the deadline leaves no room for another attempt.
    pub async fn execute<T, F, Fut>(&self, deadline: Option<Instant>, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn RegistryStub>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = Backoff::new(&self.config);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut used = None;
            let err = match self.attempt(deadline, &mut op, &mut used).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            // Only the connection this attempt ran on; a failed dial has none.
            if err.should_poison() {
                if let Some(stub) = &used {
                    self.connections.poison_if(stub);
                }
            }
            if !err.is_retryable() {
                return Err(err);
            }

            let delay = backoff.next_delay();
            if let Some(deadline) = deadline {
                if deadline.saturating_duration_since(Instant::now()) <= delay {
                    debug!(
                        cluster = %self.connections.cluster(),
                        attempt,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }
            }

            debug!(
                cluster = %self.connections.cluster(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying registry call"
            );
            sleep(delay).await;
        }
    }

    async fn attempt<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        op: &mut F,
        used: &mut Option<Arc<dyn RegistryStub>>,
    ) -> Result<T>
    where
        F: FnMut(Arc<dyn RegistryStub>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let call = async {
            let stub = self.connections.acquire().await?;
            *used = Some(stub.clone());
            op(stub).await
        };

        match deadline {
            Some(deadline) => timeout_at(deadline, call).await.unwrap_or_else(|_| {
                Err(Error::DeadlineExceeded(format!(
                    "registry call to {} timed out",
                    self.connections.cluster()
                )))
            }),
            None => call.await,
        }
    }
}
