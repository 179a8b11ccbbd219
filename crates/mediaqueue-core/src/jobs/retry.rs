//! Failure classification and exponential backoff

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

/// Phrases that mark a provider failure as transient
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "429",
    "resource exhausted",
    "resource has been exhausted",
    "resource_exhausted",
    "quota",
    "too many requests",
    "503",
    "overloaded",
];

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Back off and try again, possibly with another credential
    RateLimited,
    /// Fail the job now
    Fatal,
}

/// Check whether an error message looks like rate limiting or overload
pub fn is_rate_limit_message(message: &str) -> bool {
    let msg_lower = message.to_lowercase();
    RATE_LIMIT_PATTERNS
        .iter()
        .any(|pattern| msg_lower.contains(pattern))
}

/// Classify a failed attempt
pub fn classify(error: &Error) -> FailureKind {
    if error.is_always_fatal() {
        return FailureKind::Fatal;
    }
    if is_rate_limit_message(&error.to_string()) {
        FailureKind::RateLimited
    } else {
        FailureKind::Fatal
    }
}

/// Retry limits and backoff curve for rate-limited jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rate-limit attempts allowed before the job fails
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the random delay added to each backoff
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_jitter: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Whether another attempt is allowed after `attempts` rate-limit failures
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Deterministic part of the delay: `min(max, base * 2^attempt)`
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before the retry that follows rate-limit failure number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff(attempt) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}
