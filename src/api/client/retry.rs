//! Opt-in retry policy for transient provider failures.
//!
//! 401 handling is not part of this loop; it belongs to the dispatch state
//! machine. Timeouts are never retried here either.

use rand::Rng;
use std::time::Duration;

use crate::api::response::RawResponse;

/// Bounded retry policy used by `ApiClient`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on total attempts, including the initial request.
    pub max_attempts: u32,
    /// Base delay used for exponential backoff.
    pub initial_backoff: Duration,
    /// Maximum allowed delay between retry attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    /// A single attempt: provider errors surface to the caller untouched.
    fn default() -> Self {
        Self::with_attempts(1)
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Decide whether another attempt should be scheduled.
    pub(crate) fn should_retry(
        &self,
        outcome: &Result<RawResponse, reqwest::Error>,
        attempt: u32,
    ) -> bool {
        if attempt.saturating_add(1) >= self.max_attempts {
            return false;
        }
        match outcome {
            Ok(raw) => raw.status == 429 || (500..=599).contains(&raw.status),
            Err(err) => err.is_connect() && !err.is_timeout(),
        }
    }

    /// Compute the delay before the next attempt, respecting `Retry-After`.
    pub(crate) fn retry_delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after_secs {
            return Duration::from_secs(seconds.min(300));
        }
        let pow = 2u32.saturating_pow(attempt);
        let millis = self
            .initial_backoff
            .as_millis()
            .saturating_mul(pow as u128)
            .min(self.max_backoff.as_millis()) as u64;
        let jitter = if millis >= 4 {
            rand::thread_rng().gen_range(0..=millis / 4)
        } else {
            0
        };
        Duration::from_millis(millis.saturating_add(jitter))
    }
}
