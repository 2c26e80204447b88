//! Retry logic with exponential backoff for transient failures.
//!
//! A failed attempt is classified into a [`FailureType`]; the [`RetryPolicy`]
//! then decides, from the failure type and attempt count, whether to try again
//! and after what delay.
//!
//! # Example
//!
//! ```
//! use mfbulk_core::download::{classify_error, RetryDecision, RetryPolicy};
//! use mfbulk_core::error::{DownloadError, NetworkError};
//!
//! let policy = RetryPolicy::default();
//! let error: DownloadError = NetworkError::http_status("https://example.com/a.zip", 503).into();
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("Not retrying: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::error::{DownloadError, ExtractError, NetworkError, RemoteError};

/// Default maximum attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Default maximum jitter added to delays (500ms).
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Upper bound honoured for a server-supplied `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on retry: timeouts, 5xx, dropped connections, a share page
    /// served without a link, corrupted bodies.
    Transient,

    /// Will not succeed regardless of retries: removed files, most 4xx, local
    /// filesystem problems.
    Permanent,

    /// HTTP 429. Retried, preferring the server's `Retry-After`.
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 500 ms
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings and the default jitter.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Base delay for first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Multiplier for exponential increase
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults otherwise.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Creates a policy allowing `retries` attempts after the first one.
    #[must_use]
    pub fn with_max_retries(retries: u32) -> Self {
        Self::with_max_attempts(retries.saturating_add(1))
    }

    /// A policy that retries immediately with no jitter.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 1.0).with_jitter(Duration::ZERO)
    }

    /// Replaces the maximum random jitter.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// `attempt` is the 1-indexed attempt number that just failed.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt 1 = multiplier^0 = 1x base
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a per-entry error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | `LinkNotFound`, `MalformedPage` | Transient |
/// | `SourceRemoved` | Permanent |
/// | Timeout, connection failure | Transient |
/// | HTTP status | see [`classify_http_status`] |
/// | Hash or size mismatch | Transient |
/// | Filesystem | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Extract(ExtractError::SourceRemoved) => FailureType::Permanent,
        DownloadError::Extract(ExtractError::LinkNotFound | ExtractError::MalformedPage) => {
            FailureType::Transient
        }
        DownloadError::Network(network) => classify_network(network),
        DownloadError::Integrity(_) => FailureType::Transient,
        DownloadError::Filesystem(_) => FailureType::Permanent,
    }
}

/// Classifies an API error for folder listing retries.
#[must_use]
pub fn classify_remote_error(error: &RemoteError) -> FailureType {
    match error {
        RemoteError::Network(network) => classify_network(network),
        RemoteError::Decode { .. } => FailureType::Transient,
        RemoteError::Api { .. } | RemoteError::Missing { .. } => FailureType::Permanent,
    }
}

fn classify_network(error: &NetworkError) -> FailureType {
    match error {
        NetworkError::Timeout { .. } => FailureType::Transient,
        NetworkError::ConnectionFailed { message, .. } => {
            if is_tls_error(message) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        NetworkError::HttpStatus { status, .. } => classify_http_status(*status),
    }
}

/// Classifies an HTTP status code.
///
/// 408 and 5xx are transient, 429 is rate limited, every other status is
/// permanent.
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests
        status if (500..600).contains(&status) => FailureType::Transient,
        status if (400..500).contains(&status) => FailureType::Permanent,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("certificate")
        || lowered.contains("handshake")
        || lowered.contains("ssl")
        || lowered.contains(" tls")
}

/// Server-mandated delay carried by a rate-limited error, if any.
#[must_use]
pub fn retry_after_delay(error: &DownloadError) -> Option<Duration> {
    match error {
        DownloadError::Network(NetworkError::HttpStatus {
            retry_after: Some(value),
            ..
        }) => parse_retry_after(value),
        _ => None,
    }
}

/// Parses a `Retry-After` header value into a delay.
///
/// Supports integer seconds and HTTP-dates. Returns `None` if unparseable and
/// caps excessive values at 1 hour.
///
/// ```
/// use std::time::Duration;
/// use mfbulk_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        let duration = Duration::from_secs(seconds);
        if duration > MAX_RETRY_AFTER {
            warn!(seconds, "Retry-After exceeds maximum, capping at 1 hour");
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        Err(_) => Some(Duration::ZERO),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::{FilesystemError, IntegrityError};

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert!((policy.backoff_multiplier - 2.0).abs() < f32::EPSILON);
        assert_eq!(policy.max_jitter, Duration::from_millis(500));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_retry_policy_retries_exclude_first_attempt() {
        assert_eq!(RetryPolicy::with_max_retries(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::with_max_retries(1).max_attempts(), 2);
        assert_eq!(RetryPolicy::with_max_retries(2).max_attempts(), 3);
        assert_eq!(RetryPolicy::with_max_retries(u32::MAX).max_attempts(), u32::MAX);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_secs(1),
            Duration::from_secs(4),
            2.0,
        )
        .with_jitter(Duration::ZERO);
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(4));
        assert_eq!(policy.calculate_delay(6), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.calculate_delay(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1500), "delay too large: {delay:?}");
        }
    }

    #[test]
    fn test_should_retry_until_exhausted() {
        let policy = RetryPolicy::immediate(3);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        match policy.should_retry(FailureType::Transient, 3) {
            RetryDecision::DoNotRetry { reason } => {
                assert!(reason.contains("exhausted"), "Expected exhausted in: {reason}");
            }
            other => panic!("expected DoNotRetry, got {other:?}"),
        }
    }

    #[test]
    fn test_permanent_never_retries() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_classify_extract_errors() {
        assert_eq!(
            classify_error(&ExtractError::SourceRemoved.into()),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&ExtractError::LinkNotFound.into()),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&ExtractError::MalformedPage.into()),
            FailureType::Transient
        );
    }

    #[test]
    fn test_classify_http_statuses() {
        assert_eq!(classify_http_status(404), FailureType::Permanent);
        assert_eq!(classify_http_status(403), FailureType::Permanent);
        assert_eq!(classify_http_status(408), FailureType::Transient);
        assert_eq!(classify_http_status(429), FailureType::RateLimited);
        assert_eq!(classify_http_status(503), FailureType::Transient);
        assert_eq!(classify_http_status(302), FailureType::Permanent);
    }

    #[test]
    fn test_classify_integrity_and_filesystem() {
        let integrity: DownloadError = IntegrityError::SizeMismatch {
            path: PathBuf::from("a"),
            expected: Some(1),
            actual: 0,
        }
        .into();
        assert_eq!(classify_error(&integrity), FailureType::Transient);

        let fs: DownloadError = FilesystemError::DiskFull {
            path: PathBuf::from("a"),
        }
        .into();
        assert_eq!(classify_error(&fs), FailureType::Permanent);
    }

    #[test]
    fn test_classify_tls_failure_is_permanent() {
        let error: DownloadError = NetworkError::ConnectionFailed {
            url: "https://x".into(),
            message: "invalid peer certificate: UnknownIssuer".into(),
        }
        .into();
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_remote_errors() {
        let api = RemoteError::Api {
            code: 112,
            message: "bad key".into(),
        };
        assert_eq!(classify_remote_error(&api), FailureType::Permanent);
        let decode = RemoteError::Decode {
            url: "u".into(),
            message: "eof".into(),
        };
        assert_eq!(classify_remote_error(&decode), FailureType::Transient);
        let busy: RemoteError = NetworkError::http_status("u", 502).into();
        assert_eq!(classify_remote_error(&busy), FailureType::Transient);
    }

    #[test]
    fn test_parse_retry_after_forms() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_retry_after_delay_from_error() {
        let error: DownloadError = NetworkError::HttpStatus {
            url: "u".into(),
            status: 429,
            retry_after: Some("3".into()),
        }
        .into();
        assert_eq!(retry_after_delay(&error), Some(Duration::from_secs(3)));
        assert_eq!(retry_after_delay(&ExtractError::LinkNotFound.into()), None);
    }
}
