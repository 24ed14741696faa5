use backstop::{RecoveryDecision, ResponseEnvelope};
use std::time::Duration;
use thiserror::Error;

/// Invalid limiter configuration; fatal at construction
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("limiter name must not be empty")]
    EmptyName,

    #[error("limiter `{name}`: {field} must be greater than zero")]
    NonPositive { name: String, field: &'static str },

    #[error("duplicate limiter name `{0}`")]
    DuplicateName(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Failures talking to a limiter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// No token became available before the deadline. This is backpressure, not a fault.
    #[error("timed out after {waited:?} waiting for a token from `{name}`")]
    Timeout { name: String, waited: Duration },

    #[error("rate limiter `{name}` has shut down")]
    Closed { name: String },

    #[error("no rate limiter named `{name}`")]
    UnknownLimiter { name: String },
}

impl LimiterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LimiterError::Timeout { .. })
    }
}

/// Terminal outcome of a [`Retrier`](crate::retry::Retrier) run
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The last response was not retryable, or `max_attempts` was reached
    #[error(
        "request through `{limiter}` failed with status {} after {attempts} attempt(s) ({})",
        .decision.status,
        .decision.strategy
    )]
    Exhausted {
        limiter: String,
        attempts: u32,
        decision: RecoveryDecision,
        envelope: ResponseEnvelope,
    },

    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error("transport error: {0}")]
    Transport(#[source] E),
}
