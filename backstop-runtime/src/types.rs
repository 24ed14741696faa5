//! Common types shared by the actor, the registry and the binary
//!
//! Both types serialize to JSON for the `backstop` binary:
//!
//! ```json
//! {
//!   "name": "github",
//!   "tokens": 0,
//!   "bucket_size": 5000,
//!   "observed_limit": 5000,
//!   "observed_remaining": 0,
//!   "observed_reset": 1700000000,
//!   "waiting_count": 3,
//!   "acquired_total": 5000,
//!   "timeouts_total": 12
//! }
//! ```

use backstop::{RecoveryDecision, Severity, Strategy};
use serde::{Deserialize, Serialize};

/// Point-in-time view of one limiter
///
/// Consistent with the limiter's own message order, but possibly stale relative to an
/// `acquire` that is still in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub name: String,
    /// Tokens available right now
    pub tokens: u64,
    pub bucket_size: u64,
    /// Last `x-ratelimit-limit` seen, if any
    pub observed_limit: Option<u64>,
    /// Last `x-ratelimit-remaining` seen, if any
    pub observed_remaining: Option<u64>,
    /// Last `x-ratelimit-reset` seen, as sent (epoch or relative seconds)
    pub observed_reset: Option<u64>,
    /// Callers queued for a token
    pub waiting_count: usize,
    /// Tokens handed out since start
    pub acquired_total: u64,
    /// Waiters that gave up on their deadline since start
    pub timeouts_total: u64,
}

/// A [`RecoveryDecision`] flattened for display, with the delay for each retry spelled out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionReport {
    pub status: u16,
    pub recoverable: bool,
    pub strategy: Strategy,
    pub severity: Severity,
    pub max_attempts: u32,
    pub trips_circuit: bool,
    /// Delay after attempt 1, 2, ... up to the last attempt that may be followed by a retry
    pub retry_delays_ms: Vec<u64>,
}

impl From<&RecoveryDecision> for DecisionReport {
    fn from(decision: &RecoveryDecision) -> Self {
        let retry_delays_ms = (1..decision.max_attempts)
            .filter(|_| decision.recoverable)
            .map(|attempt| decision.retry_delay_ms(attempt))
            .collect();

        DecisionReport {
            status: decision.status,
            recoverable: decision.recoverable,
            strategy: decision.strategy,
            severity: decision.severity,
            max_attempts: decision.max_attempts,
            trips_circuit: decision.trips_circuit,
            retry_delays_ms,
        }
    }
}
