//! Retry policies
//!
//! Classified retries for remote store calls. Each failure is mapped to an
//! [`ErrorClass`] that decides whether the call is tried again and how long
//! to wait first. Every terminal failure sends exactly one best-effort
//! notification before it is returned.

use odv_core::{Notifier, RetrySettings};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Failure classes of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttled by the server, optionally with a server-provided wait
    RateLimited { retry_after: Option<Duration> },
    AuthFailure,
    QuotaExceeded,
    NotFound,
    Transient,
    Unclassified,
    /// Local failure, or a call that already took effect remotely
    Permanent,
}

impl ErrorClass {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::RateLimited { .. } => "rate_limited",
            ErrorClass::AuthFailure => "auth_failure",
            ErrorClass::QuotaExceeded => "quota_exceeded",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Transient => "transient",
            ErrorClass::Unclassified => "unclassified",
            ErrorClass::Permanent => "permanent",
        }
    }

    /// Whether a failure of this class may be tried again.
    pub fn is_retryable(&self, retry_not_found: bool) -> bool {
        match self {
            ErrorClass::RateLimited { .. } | ErrorClass::Transient | ErrorClass::Unclassified => true,
            ErrorClass::NotFound => retry_not_found,
            ErrorClass::AuthFailure | ErrorClass::QuotaExceeded | ErrorClass::Permanent => false,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug)]
pub struct Classified<E> {
    /// Class of the last failure
    pub class: ErrorClass,
    /// The last error returned by the operation
    pub error: E,
    /// Number of times the operation ran
    pub attempts: u32,
}

impl<E> Classified<E> {
    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for Classified<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} after {} attempt(s))", self.error, self.class, self.attempts)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Classified<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 means no retries)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum backoff delay. Server-provided waits are not capped.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add random jitter to backoff delays
    pub jitter: bool,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Whether not-found failures are retried
    pub retry_not_found: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: false,
            jitter_factor: 0.3,
            retry_not_found: false,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
            jitter: settings.jitter,
            retry_not_found: settings.retry_not_found,
            ..Default::default()
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set max delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set jitter factor
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_retry_not_found(mut self, retry: bool) -> Self {
        self.retry_not_found = retry;
        self
    }
}

/// Retry policy implementation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn default_config() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Create with fixed delay (no exponential backoff)
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::new(RetryConfig {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: false,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff delay before retry number `attempt` (1-indexed):
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.powi(exponent);
        let max_secs = self.config.max_delay.as_secs_f64();
        let secs = (self.config.initial_delay.as_secs_f64() * factor).min(max_secs);
        let delay = Duration::from_secs_f64(secs.max(0.0));

        if self.config.jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    /// Delay before retrying a failure of `class`. A server-provided
    /// `Retry-After` wins over backoff.
    pub fn delay_for(&self, class: &ErrorClass, attempt: u32) -> Duration {
        match class {
            ErrorClass::RateLimited {
                retry_after: Some(wait),
            } => *wait,
            _ => self.delay_for_attempt(attempt),
        }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        let jitter_range = delay.mul_f64(self.config.jitter_factor);
        if jitter_range.is_zero() {
            return delay;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(Duration::ZERO..jitter_range);

        if rng.gen_bool(0.5) {
            delay + jitter
        } else {
            delay.saturating_sub(jitter)
        }
    }

    /// Whether a failure of `class` after `attempt` runs gets another try.
    pub fn should_retry(&self, class: &ErrorClass, attempt: u32) -> bool {
        class.is_retryable(self.config.retry_not_found) && attempt <= self.config.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable class or
/// runs out of retries.
///
/// `context` labels log lines and the failure notification. A failing
/// notifier is logged and ignored.
pub async fn execute_with_retry<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    context: &str,
    notifier: &dyn Notifier,
    classify: C,
    mut operation: F,
) -> Result<T, Classified<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
    E: fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context, attempt, "Remote operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let class = classify(&error);
        if policy.should_retry(&class, attempt) {
            let delay = policy.delay_for(&class, attempt);
            warn!(
                context,
                attempt,
                class = %class,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Remote operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        error!(
            context,
            attempts = attempt,
            class = %class,
            error = %error,
            "Remote operation failed"
        );

        let message = format!("OneDrive {context}: {error}");
        if let Err(notify_error) = notifier.notify(&message).await {
            warn!(context, error = %notify_error, "Failed to deliver failure notification");
        }

        return Err(Classified {
            class,
            error,
            attempts: attempt,
        });
    }
}

/// Retry policy bound to a notification sink.
#[derive(Clone)]
pub struct RetryingClient {
    policy: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy, notifier: Arc<dyn Notifier>) -> Self {
        Self { policy, notifier }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// See [`execute_with_retry`].
    pub async fn execute<F, Fut, T, E, C>(&self, context: &str, classify: C, operation: F) -> Result<T, Classified<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
        E: fmt::Display,
    {
        execute_with_retry(&self.policy, context, self.notifier.as_ref(), classify, operation).await
    }
}

impl fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
