//! Retry delay formulas
//!
//! Attempts are numbered from 1. The exponential schedule is `min(base * 2^attempt, cap)`, so
//! the first retry after attempt 1 already waits twice the base.

use std::time::Duration;

/// How long to wait before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDelay {
    /// Do not wait (and usually do not retry)
    None,
    /// Same delay for every attempt
    Fixed(Duration),
    /// `min(base * 2^attempt, cap)`
    Exponential { base: Duration, cap: Duration },
}

impl RetryDelay {
    pub const fn fixed_ms(ms: u64) -> Self {
        RetryDelay::Fixed(Duration::from_millis(ms))
    }

    pub const fn exponential_ms(base_ms: u64, cap_ms: u64) -> Self {
        RetryDelay::Exponential {
            base: Duration::from_millis(base_ms),
            cap: Duration::from_millis(cap_ms),
        }
    }

    /// Delay to apply after `attempt` failed
    ///
    /// # Example
    ///
    /// ```
    /// use backstop::RetryDelay;
    /// use std::time::Duration;
    ///
    /// let delay = RetryDelay::exponential_ms(1_000, 30_000);
    /// assert_eq!(delay.delay(1), Duration::from_millis(2_000));
    /// assert_eq!(delay.delay(3), Duration::from_millis(8_000));
    /// assert_eq!(delay.delay(10), Duration::from_millis(30_000));
    /// ```
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryDelay::None => Duration::ZERO,
            RetryDelay::Fixed(delay) => *delay,
            RetryDelay::Exponential { base, cap } => {
                let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
                let cap_ms = cap.as_millis().min(u64::MAX as u128) as u64;
                Duration::from_millis(exponential_ms(base_ms, cap_ms, attempt))
            }
        }
    }
}

fn exponential_ms(base_ms: u64, cap_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(cap_ms)
}
