//! Retry with exponential backoff and rate-limit reset hints
//!
//! Rate-limited calls honor the server's `retry-after` hint (delta-seconds
//! or HTTP-date); other transient failures back off exponentially with
//! jitter. All delays are capped so total latency stays bounded.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Hard ceiling on any single backoff delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: MAX_BACKOFF,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay (clamped to the global cap)
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay.min(MAX_BACKOFF);
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay for a given attempt number (1-based).
    ///
    /// Without jitter this is monotonically non-decreasing in `attempt` and
    /// always capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64) as u64;

        let final_ms = if self.jitter {
            // Up to 25% jitter; the cap still holds after jitter
            let jitter_range = capped / 4;
            (capped + pseudo_jitter(jitter_range)).min(self.max_delay.as_millis() as u64)
        } else {
            capped
        };

        Duration::from_millis(final_ms)
    }
}

/// Cheap jitter from the clock's subsecond nanos; good enough for backoff
/// spread without pulling in a rand dependency.
fn pseudo_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    nanos % max
}

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient: retry with the configured backoff
    Retry,
    /// Rate-limited with a server-supplied reset hint
    RetryAfter(Duration),
    /// Not retryable
    Fatal,
}

/// Parse a `retry-after` header value: either delta-seconds or an HTTP-date.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    // HTTP-date (IMF-fixdate is RFC 2822 compatible)
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    delta.to_std().ok()
}

/// Error returned when all attempts are exhausted
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error encountered
    pub last_error: E,
    /// Total number of attempts made
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operation failed after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Execute an async operation with classified retries.
///
/// `classify` maps each error to a [`RetryDecision`]; a server hint wins
/// over the computed backoff but is still capped at the configured maximum.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    config: &RetryConfig,
    mut operation: F,
    classify: C,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDecision,
    E: std::fmt::Debug,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let decision = classify(&e);
                if decision == RetryDecision::Fatal || attempt == config.max_attempts {
                    return Err(RetryError {
                        last_error: e,
                        attempts: attempt,
                    });
                }

                let delay = match decision {
                    RetryDecision::RetryAfter(hint) => hint.min(config.max_delay),
                    _ => config.delay_for_attempt(attempt),
                };
                warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "operation failed, retrying"
                );
                last_error = Some(e);
                sleep(delay).await;
            }
        }
    }

    // The loop always returns out of the final attempt above
    Err(RetryError {
        last_error: last_error.expect("at least one attempt was made"),
        attempts: config.max_attempts,
    })
}
