// src/retry.rs

//! Back-off policy shared by executor retries and persistence retries.

use std::time::Duration;

use tracing::{error, info};

/// Exponential back-off: `base_delay * multiplier^(attempts - 1)`, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor between consecutive retries.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Policy without any waiting, used by tests.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay to wait after `attempts` failures (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Run `op` until it succeeds, sleeping between failures according to
/// `policy`. Used for durable writes: the caller must not continue past an
/// unpersisted state change, so there is no attempt ceiling.
pub async fn retry_until_ok<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> T
where
    F: FnMut() -> anyhow::Result<T>,
{
    let mut failures: u32 = 0;
    loop {
        match op() {
            Ok(value) => {
                if failures > 0 {
                    info!(what, failures, "write succeeded after retries");
                }
                return value;
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay = policy.next_delay(failures);
                error!(
                    what,
                    failures,
                    ?delay,
                    error = %format!("{err:#}"),
                    "persisting state failed; backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 2.0, Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::new(Duration::from_secs(2), 2.0, Duration::from_secs(60));

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 10.0, Duration::from_secs(30));
        assert_eq!(policy.next_delay(3), Duration::from_secs(30));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn zero_attempts_uses_base_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(500), 2.0, Duration::from_secs(5));
        assert_eq!(policy.next_delay(0), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retry_until_ok_keeps_going_until_success() {
        let mut calls = 0;
        let value = retry_until_ok(&RetryPolicy::immediate(), "test write", || {
            calls += 1;
            if calls < 4 {
                anyhow::bail!("disk full");
            }
            Ok(calls)
        })
        .await;
        assert_eq!(value, 4);
    }

    #[test]
    fn immediate_policy_never_waits() {
        assert_eq!(RetryPolicy::immediate().next_delay(7), Duration::ZERO);
    }
}
