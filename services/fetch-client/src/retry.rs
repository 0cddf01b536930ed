//! Retry policy
//!
//! Exponential backoff with an upper bound and additive jitter:
//! `delay(n) = min(base · 2^n, max) + U[0, jitter]` for the n-th retry
//! (n starting at 0). A throttling hint from the server raises the delay to
//! at least the hint.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay.
    #[serde(with = "millis")]
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay before retry `n`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full delay before retry `n`, honoring a server hint when present.
    pub fn delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let scheduled = self.backoff(retry) + self.sample_jitter();
        match hint {
            Some(hint) => scheduled.max(hint),
            None => scheduled,
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Durations as integer milliseconds in config files.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let p = no_jitter();
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(800));
        assert_eq!(p.backoff(4), Duration::from_millis(1_000));
        assert_eq!(p.backoff(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_hint_raises_delay() {
        let p = no_jitter();
        assert_eq!(p.delay(0, Some(Duration::from_secs(5))), Duration::from_secs(5));
        // A hint shorter than the schedule does not shorten it
        assert_eq!(p.delay(2, Some(Duration::from_millis(10))), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_bounded() {
        let p = RetryPolicy {
            jitter: Duration::from_millis(50),
            ..no_jitter()
        };
        for _ in 0..100 {
            let d = p.delay(0, None);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_attempt_budget() {
        let p = no_jitter();
        assert!(p.allows_retry(4));
        assert!(!p.allows_retry(5));
    }
}
