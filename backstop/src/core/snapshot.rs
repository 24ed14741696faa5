//! Provider rate-limit headers parsed into typed values
//!
//! Providers disagree on spelling, so each field has a list of header names checked in
//! priority order. The first header that is present and parses wins; a garbled value falls
//! through to the next spelling instead of hiding it.
//!
//! Counts are unsigned integers. Some providers send decimals (`"0.5"`), which are floored.
//! Negative, non-finite and non-numeric values are treated as absent.

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Header names for the request limit, highest priority first
pub const LIMIT_HEADERS: [&str; 2] = ["x-ratelimit-limit", "x-rate-limit-limit"];
/// Header names for the remaining request count, highest priority first
pub const REMAINING_HEADERS: [&str; 2] = ["x-ratelimit-remaining", "x-rate-limit-remaining"];
/// Header names for the reset time, highest priority first
pub const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset", "x-rate-limit-reset"];
/// Seconds to wait before retrying; only consulted for 429
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Reset values at or above this are Unix timestamps, below it they are relative seconds
///
/// 10^9 seconds is September 2001; no provider resets a window 31 years out.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// When the provider's window resets, in whichever form it was reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetHint {
    /// Absolute Unix time in seconds
    EpochSeconds(u64),
    /// Seconds from when the response was produced
    DeltaSeconds(u64),
}

impl ResetHint {
    pub fn from_raw(secs: u64) -> Self {
        if secs >= EPOCH_THRESHOLD {
            ResetHint::EpochSeconds(secs)
        } else {
            ResetHint::DeltaSeconds(secs)
        }
    }

    /// The value as it appeared on the wire
    pub fn raw(&self) -> u64 {
        match self {
            ResetHint::EpochSeconds(secs) | ResetHint::DeltaSeconds(secs) => *secs,
        }
    }

    /// Time left until the reset, measured from `now`
    ///
    /// An epoch reset already in the past yields zero.
    pub fn until(&self, now: SystemTime) -> Duration {
        match self {
            ResetHint::DeltaSeconds(secs) => Duration::from_secs(*secs),
            ResetHint::EpochSeconds(secs) => (UNIX_EPOCH + Duration::from_secs(*secs))
                .duration_since(now)
                .unwrap_or(Duration::ZERO),
        }
    }
}

/// The provider's self-reported capacity
///
/// # Example
///
/// ```
/// use backstop::{RateLimitSnapshot, ResetHint};
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-rate-limit-limit", "5000".parse().unwrap());
/// headers.insert("x-rate-limit-remaining", "4999".parse().unwrap());
/// headers.insert("x-rate-limit-reset", "60".parse().unwrap());
///
/// let snapshot = RateLimitSnapshot::from_headers(&headers).unwrap();
/// assert_eq!(snapshot.limit, Some(5000));
/// assert_eq!(snapshot.remaining, Some(4999));
/// assert_eq!(snapshot.reset, Some(ResetHint::DeltaSeconds(60)));
///
/// assert!(RateLimitSnapshot::from_headers(&HeaderMap::new()).is_none());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<ResetHint>,
}

impl RateLimitSnapshot {
    /// Parse the rate-limit headers, `None` if none of the three fields is present
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let snapshot = RateLimitSnapshot {
            limit: first_count(headers, &LIMIT_HEADERS),
            remaining: first_count(headers, &REMAINING_HEADERS),
            reset: first_count(headers, &RESET_HEADERS).map(ResetHint::from_raw),
        };

        if snapshot.is_empty() {
            None
        } else {
            Some(snapshot)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset.is_none()
    }

    /// The provider reports no capacity left
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Parse `retry-after` as integer seconds
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn first_count(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_count)
    })
}

fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return Some(n);
    }

    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 && n <= u64::MAX as f64 => Some(n.floor() as u64),
        _ => None,
    }
}
