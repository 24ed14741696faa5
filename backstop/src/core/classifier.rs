//! Status code to recovery decision table
//!
//! Classification is a pure, total function of the status code. Server errors are treated as
//! systemic and trip the circuit; client errors other than 408 and 429 are terminal; 408, 429
//! and 504 are congestion signals that retry without implying the service is broken.
//!
//! The table is data. Adding a status is one more row in `POLICY_TABLE`.

use super::backoff::RetryDelay;
use super::envelope::ResponseEnvelope;
use std::fmt;
use std::time::Duration;

/// What the caller should do about a failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Strategy {
    /// Retry after a fixed delay
    Retry,
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Wait for the provider's window to reset, then retry
    WaitUntil,
    /// Back off the whole endpoint
    CircuitBreak,
    /// Give up on this request
    FailFast,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Retry => "retry",
            Strategy::RetryWithBackoff => "retry_with_backoff",
            Strategy::WaitUntil => "wait_until",
            Strategy::CircuitBreak => "circuit_break",
            Strategy::FailFast => "fail_fast",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad the failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Transient,
    Degraded,
    Critical,
    Permanent,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Transient => "transient",
            Severity::Degraded => "degraded",
            Severity::Critical => "critical",
            Severity::Permanent => "permanent",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the status table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub recoverable: bool,
    pub strategy: Strategy,
    pub delay: RetryDelay,
    pub max_attempts: u32,
    pub trips_circuit: bool,
    pub severity: Severity,
}

const FIXED_SECOND: RetryDelay = RetryDelay::fixed_ms(1_000);
const SERVER_BACKOFF: RetryDelay = RetryDelay::exponential_ms(1_000, 30_000);
const RATE_LIMIT_BACKOFF: RetryDelay = RetryDelay::exponential_ms(5_000, 60_000);

/// Applied to 5xx codes without a row of their own
const SERVER_ERROR: RecoveryPolicy = RecoveryPolicy {
    recoverable: true,
    strategy: Strategy::RetryWithBackoff,
    delay: SERVER_BACKOFF,
    max_attempts: 3,
    trips_circuit: true,
    severity: Severity::Critical,
};

/// Applied to everything that is neither in the table nor a 5xx
const FAIL_FAST: RecoveryPolicy = RecoveryPolicy {
    recoverable: false,
    strategy: Strategy::FailFast,
    delay: RetryDelay::None,
    max_attempts: 1,
    trips_circuit: false,
    severity: Severity::Permanent,
};

static POLICY_TABLE: [(u16, RecoveryPolicy); 6] = [
    (
        408,
        RecoveryPolicy {
            recoverable: true,
            strategy: Strategy::Retry,
            delay: FIXED_SECOND,
            max_attempts: 3,
            trips_circuit: false,
            severity: Severity::Transient,
        },
    ),
    (
        429,
        RecoveryPolicy {
            recoverable: true,
            strategy: Strategy::WaitUntil,
            delay: RATE_LIMIT_BACKOFF,
            max_attempts: 5,
            trips_circuit: false,
            severity: Severity::Degraded,
        },
    ),
    (500, SERVER_ERROR),
    (
        502,
        RecoveryPolicy {
            strategy: Strategy::CircuitBreak,
            ..SERVER_ERROR
        },
    ),
    (
        503,
        RecoveryPolicy {
            strategy: Strategy::CircuitBreak,
            ..SERVER_ERROR
        },
    ),
    (
        504,
        RecoveryPolicy {
            recoverable: true,
            strategy: Strategy::Retry,
            delay: FIXED_SECOND,
            max_attempts: 3,
            trips_circuit: true,
            severity: Severity::Transient,
        },
    ),
];

/// Look up the table row for `status`
pub fn policy_for(status: u16) -> RecoveryPolicy {
    POLICY_TABLE
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, policy)| *policy)
        .unwrap_or(if (500..600).contains(&status) {
            SERVER_ERROR
        } else {
            FAIL_FAST
        })
}

/// The classifier's verdict on one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryDecision {
    pub status: u16,
    pub recoverable: bool,
    pub strategy: Strategy,
    pub delay: RetryDelay,
    pub max_attempts: u32,
    pub trips_circuit: bool,
    pub severity: Severity,
}

impl RecoveryDecision {
    fn from_policy(status: u16, policy: RecoveryPolicy) -> Self {
        RecoveryDecision {
            status,
            recoverable: policy.recoverable,
            strategy: policy.strategy,
            delay: policy.delay,
            max_attempts: policy.max_attempts,
            trips_circuit: policy.trips_circuit,
            severity: policy.severity,
        }
    }

    /// Delay before the attempt that follows `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.delay.delay(attempt)
    }

    pub fn retry_delay_ms(&self, attempt: u32) -> u64 {
        self.retry_delay(attempt).as_millis().min(u64::MAX as u128) as u64
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.recoverable && attempts < self.max_attempts
    }
}

/// Classify a response by its status code
///
/// For 429 the delay prefers the provider's own hint: `retry-after` first, then the
/// rate-limit reset measured from when the response was received, then exponential backoff.
///
/// # Example
///
/// ```
/// use backstop::{ResponseEnvelope, Severity, Strategy, classify};
///
/// let envelope = ResponseEnvelope::builder(503).build().unwrap();
/// let decision = classify(&envelope);
///
/// assert!(decision.recoverable);
/// assert!(decision.trips_circuit);
/// assert_eq!(decision.strategy, Strategy::CircuitBreak);
/// assert_eq!(decision.severity, Severity::Critical);
/// assert_eq!(decision.max_attempts, 3);
/// ```
pub fn classify(envelope: &ResponseEnvelope) -> RecoveryDecision {
    let status = envelope.status_code();
    let mut decision = classify_status(status);

    if status == 429 {
        if let Some(hint) = provider_delay(envelope) {
            decision.delay = RetryDelay::Fixed(hint);
        }
    }

    decision
}

/// Classify a bare status code, without any header hints
pub fn classify_status(status: u16) -> RecoveryDecision {
    RecoveryDecision::from_policy(status, policy_for(status))
}

fn provider_delay(envelope: &ResponseEnvelope) -> Option<Duration> {
    envelope.retry_after().or_else(|| {
        envelope
            .rate_limit()
            .and_then(|snapshot| snapshot.reset)
            .map(|reset| reset.until(envelope.timing().received_at))
            .filter(|wait| !wait.is_zero())
    })
}
