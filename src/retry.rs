use std::{future::Future, time::Duration};

use log::{debug, warn};
use rand::Rng;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Fraction of hopeless failures that actually get logged.
pub const DEFAULT_LOG_SAMPLE_RATE: f64 = 0.05;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Will fail the same way every time (HTTP 404). Never retried.
    Permanent,
    /// Worth another go (timeouts, resets, DNS, HTTP 5xx).
    Transient,
    /// Anything the classifier doesn't recognise. Not retried.
    Unclassified,
}

/// Terminal failure of [`RetryPolicy::execute`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("permanent failure: {0}")]
    Permanent(E),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("unclassified failure: {0}")]
    Unclassified(E),
}

/// Linear-backoff retry: the wait before retry `k` (1-based) is `base_delay * k`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub log_sample_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            log_sample_rate: DEFAULT_LOG_SAMPLE_RATE,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_log_sample_rate(mut self, rate: f64) -> Self {
        self.log_sample_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn delay_before(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out of
    /// retries. `operation` receives the zero-based attempt number.
    pub async fn execute<T, E, Op, Fut, C>(
        &self,
        label: &str,
        mut operation: Op,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> FailureClass,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match classify(&err) {
                FailureClass::Permanent => {
                    debug!("{label}: permanent failure, not retrying: {err}");
                    return Err(RetryError::Permanent(err));
                }
                FailureClass::Transient if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    debug!(
                        "{label}: attempt {attempt} failed ({err}), retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                FailureClass::Transient => {
                    self.sampled_warn(format_args!(
                        "{label}: giving up after {} attempts: {err}",
                        attempt + 1
                    ));
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: err,
                    });
                }
                FailureClass::Unclassified => {
                    self.sampled_warn(format_args!("{label}: failed: {err}"));
                    return Err(RetryError::Unclassified(err));
                }
            }
        }
    }

    // Emits roughly `log_sample_rate` of the calls it receives.
    fn sampled_warn(&self, message: std::fmt::Arguments<'_>) {
        let rate = self.log_sample_rate.clamp(0.0, 1.0);
        if rate > 0.0 && rand::rng().random_bool(rate) {
            warn!("{message} (sampled)");
        }
    }
}
