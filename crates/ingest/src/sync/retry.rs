//! Bounded exponential backoff around provider calls

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProviderError;

/// Retry policy for transient provider failures (429, 5xx, transport)
///
/// Non-transient errors are returned on the first attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that calls exactly once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Run `op`, retrying transient errors until attempts run out
    pub fn run<T>(
        &self,
        op_name: &str,
        op: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        self.run_when(op_name, ProviderError::is_transient, op)
    }

    /// Run `op`, retrying errors `is_transient` accepts until attempts run out
    pub fn run_when<T, E: std::fmt::Display>(
        &self,
        op_name: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    let base = self.delay_for(attempt - 1);
                    let delay = base + Duration::from_millis(rand_jitter(base.as_millis() as u64 / 4));
                    log::warn!(
                        "[SYNC] {} failed (attempt {}/{}): {}, retrying in {}ms",
                        op_name,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Random jitter in `0..=bound_ms`
fn rand_jitter(bound_ms: u64) -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    if bound_ms == 0 {
        return 0;
    }
    let hasher = RandomState::new().build_hasher();
    hasher.finish() % (bound_ms + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(80), Duration::from_millis(1_000));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let calls = Cell::new(0);
        let result = instant().run("op", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(ProviderError::RateLimited)
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = instant().run("op", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Http { status: 503 })
        });
        assert!(matches!(result, Err(ProviderError::Http { status: 503 })));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_permanent_errors_fail_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = instant().run("op", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Http { status: 404 })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_none_calls_once() {
        let calls = Cell::new(0);
        let _: Result<(), _> = RetryPolicy::none().run("op", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::RateLimited)
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_custom_classifier() {
        let calls = Cell::new(0);
        let result: Result<(), String> = instant().run_when(
            "op",
            |e: &String| e == "busy",
            || {
                calls.set(calls.get() + 1);
                Err(if calls.get() == 1 { "busy" } else { "denied" }.to_string())
            },
        );
        assert_eq!(result.unwrap_err(), "denied");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(rand_jitter(0), 0);
        for _ in 0..20 {
            assert!(rand_jitter(50) <= 50);
        }
    }
}
