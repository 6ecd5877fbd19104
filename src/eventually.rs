//! Cancellable polling
//!
//! `eventually` re-runs a fallible check until it reports `true`, the
//! timeout elapses, or the cancellation token fires. A check that returns an
//! error stops the loop immediately.
//!
//! # Example
//!
//! ```ignore
//! use kindling::eventually::eventually;
//! use std::time::Duration;
//!
//! eventually(|| async { Ok::<_, kube::Error>(count_pods().await? >= 3) })
//!     .timeout(Duration::from_secs(60))
//!     .interval(Duration::from_millis(500))
//!     .cancel_on(token.clone())
//!     .await_condition()
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Error type for eventually checks
#[derive(Debug, thiserror::Error)]
pub enum ConditionError<E> {
    #[error("condition not met after {attempts} attempts over {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("condition check failed: {0}")]
    Check(E),
}

/// Builder for eventually checks
pub struct Eventually<F> {
    condition: F,
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
}

/// Create an eventually check that retries until the condition holds
///
/// Default timeout: 30 seconds
/// Default interval: 250ms
pub fn eventually<F, Fut, E>(condition: F) -> Eventually<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    Eventually {
        condition,
        timeout: Duration::from_secs(30),
        interval: Duration::from_millis(250),
        cancel: CancellationToken::new(),
    }
}

impl<F, Fut, E> Eventually<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    /// Set the timeout duration
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop polling when `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the check until success, error, timeout, or cancellation
    ///
    /// Returns the number of attempts it took.
    pub async fn await_condition(mut self) -> Result<u32, ConditionError<E>> {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ConditionError::Cancelled { attempts });
            }

            attempts += 1;
            if (self.condition)().await.map_err(ConditionError::Check)? {
                return Ok(attempts);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(ConditionError::Timeout { attempts, elapsed });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(ConditionError::Cancelled { attempts });
                }
                _ = sleep(self.interval) => {}
            }
        }
    }
}
