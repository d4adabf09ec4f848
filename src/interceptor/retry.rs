//! Retry strategies, predicates and the retry interceptor.
//!
//! [`RetryInterceptor`] re-runs the rest of the chain when it fails with a
//! transport error. Only thrown failures are retried; a response with a
//! non-2xx status is returned as is. Once the strategy runs out of attempts,
//! the last failure is returned unchanged.

use crate::{Chain, Error, ErrorKind, Interceptor, Response, Result};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Defines how long to wait before each retry, and how many retries to make.
///
/// # Examples
///
/// ```
/// use callwire::RetryStrategy;
/// use std::time::Duration;
///
/// // No retries
/// let no_retry = RetryStrategy::None;
///
/// // Linear backoff: 100ms, 200ms, 300ms
/// let linear = RetryStrategy::Linear {
///     delay: Duration::from_millis(100),
///     max_retries: 3,
/// };
/// assert_eq!(linear.delay_for_attempt(2), Some(Duration::from_millis(200)));
///
/// // Exponential backoff: 100ms, 200ms, 400ms, 800ms...
/// let exponential = RetryStrategy::ExponentialBackoff {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     max_retries: 5,
///     jitter: true,
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Do not retry.
    #[default]
    None,

    /// Wait `delay × n` before the n-th retry.
    Linear {
        /// The base delay.
        delay: Duration,
        /// The maximum number of retries.
        max_retries: usize,
    },

    /// Retry with exponentially increasing delays.
    ///
    /// Each retry waits for `initial_delay * 2^(n-1)` (capped at `max_delay`).
    /// Optional jitter adds randomness to prevent thundering herd.
    ExponentialBackoff {
        /// The delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between retries.
        max_delay: Duration,
        /// The maximum number of retries.
        max_retries: usize,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },

    /// Custom retry logic.
    ///
    /// The function receives the retry number (starting from 1) and returns
    /// `Some(delay)` to retry after the delay, or `None` to stop.
    Custom {
        /// Function that determines the delay before a retry.
        delay_fn: fn(retry: usize) -> Option<Duration>,
    },
}

impl RetryStrategy {
    /// Returns the delay before the given retry, or `None` if retries are
    /// exhausted.
    ///
    /// # Arguments
    ///
    /// * `retry` - The retry number (1-indexed, so 1 = first retry)
    pub fn delay_for_attempt(&self, retry: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::Linear { delay, max_retries } => {
                if retry == 0 || retry > *max_retries {
                    None
                } else {
                    Some(delay.saturating_mul(u32::try_from(retry).unwrap_or(u32::MAX)))
                }
            }
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                max_retries,
                jitter,
            } => {
                if retry == 0 || retry > *max_retries {
                    return None;
                }

                let multiplier = 2u64.saturating_pow(retry.saturating_sub(1) as u32);
                let base_delay =
                    initial_delay.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = base_delay.min(*max_delay);

                if *jitter {
                    // random value between 50% and 100% of the delay
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(jitter_factor))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Custom { delay_fn } => delay_fn(retry),
        }
    }

    /// Returns the maximum number of retries, if known.
    pub fn max_retries(&self) -> Option<usize> {
        match self {
            RetryStrategy::None => Some(0),
            RetryStrategy::Linear { max_retries, .. } => Some(*max_retries),
            RetryStrategy::ExponentialBackoff { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Custom { .. } => None,
        }
    }
}

/// Decides whether a failed attempt should be retried.
///
/// # Examples
///
/// ```
/// use callwire::{Error, ErrorKind, RetryPredicate};
///
/// struct RetryOnRefused;
///
/// impl RetryPredicate for RetryOnRefused {
///     fn should_retry(&self, error: &Error, _retry: usize) -> bool {
///         error.kind() == ErrorKind::ConnectionRefused
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// # Arguments
    ///
    /// * `error` - The failure of the last attempt
    /// * `retry` - The number of the retry that would follow (1-indexed)
    fn should_retry(&self, error: &Error, retry: usize) -> bool;
}

/// Retry every transport failure. This is the default.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransport;

impl RetryPredicate for RetryOnTransport {
    fn should_retry(&self, error: &Error, _retry: usize) -> bool {
        error.is_transport()
    }
}

/// Retry failures that [`Error::is_retryable`] accepts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, error: &Error, _retry: usize) -> bool {
        error.is_retryable()
    }
}

/// Retry only on timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, error: &Error, _retry: usize) -> bool {
        matches!(
            error.kind(),
            ErrorKind::ConnectionTimeout | ErrorKind::ReadTimeout
        )
    }
}

/// Retry only when the connection could not be established.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPredicate for RetryOnConnectionError {
    fn should_retry(&self, error: &Error, _retry: usize) -> bool {
        matches!(
            error.kind(),
            ErrorKind::ConnectionRefused | ErrorKind::NetworkUnavailable
        )
    }
}

/// Retries if ANY of the predicates agree.
///
/// # Examples
///
/// ```
/// use callwire::retry::{OrPredicate, RetryOnConnectionError, RetryOnTimeout};
///
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOnConnectionError),
///     Box::new(RetryOnTimeout),
/// ]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, error: &Error, retry: usize) -> bool {
        self.predicates.iter().any(|p| p.should_retry(error, retry))
    }
}

/// Retries only if ALL of the predicates agree.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, error: &Error, retry: usize) -> bool {
        self.predicates.iter().all(|p| p.should_retry(error, retry))
    }
}

/// Re-runs the rest of the chain on transport failures.
///
/// # Examples
///
/// ```
/// use callwire::{Client, RetryInterceptor};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), callwire::Error> {
/// // waits 100ms, then 200ms
/// let client = Client::builder()
///     .interceptor(RetryInterceptor::new(2, Duration::from_millis(100)))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RetryInterceptor {
    strategy: RetryStrategy,
    predicate: Box<dyn RetryPredicate>,
}

impl RetryInterceptor {
    /// Retries up to `max_retries` times with linear backoff: the n-th retry
    /// waits `delay × n`.
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Linear { delay, max_retries })
    }

    pub fn with_strategy(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            predicate: Box::new(RetryOnTransport),
        }
    }

    /// Replaces the default [`RetryOnTransport`] predicate.
    pub fn predicate(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.predicate = Box::new(predicate);
        self
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn intercept(&self, chain: Chain) -> Result<Response> {
        let mut retry = 0;
        loop {
            let error = match chain.proceed(chain.request().clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            retry += 1;

            tracing::warn!(
                error = %error,
                attempt = retry,
                method = %chain.request().method(),
                url = %chain.request().url(),
                "Request failed"
            );

            if !self.predicate.should_retry(&error, retry) {
                return Err(error);
            }
            let Some(delay) = self.strategy.delay_for_attempt(retry) else {
                tracing::warn!(attempts = retry, "Retries exhausted");
                return Err(error);
            };

            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = retry,
                "Retrying request after delay"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
