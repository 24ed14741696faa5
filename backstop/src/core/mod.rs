//! Core components of the backstop library
//!
//! - [`envelope`]: immutable view of a completed HTTP exchange
//! - [`snapshot`]: provider rate-limit headers parsed into typed values
//! - [`backoff`]: retry delay formulas
//! - [`classifier`]: the status code to recovery decision table

pub mod backoff;
pub mod classifier;
pub mod envelope;
pub mod snapshot;

pub use backoff::RetryDelay;
pub use classifier::{
    RecoveryDecision, RecoveryPolicy, Severity, Strategy, classify, classify_status, policy_for,
};
pub use envelope::{ResponseEnvelope, ResponseEnvelopeBuilder, Timing};
pub use snapshot::{RateLimitSnapshot, ResetHint};

use std::error::Error;
use std::fmt;

/// Errors that can occur while constructing a [`ResponseEnvelope`]
///
/// # Example
///
/// ```
/// use backstop::{EnvelopeError, ResponseEnvelope};
///
/// match ResponseEnvelope::builder(42).build() {
///     Err(EnvelopeError::InvalidStatus(code)) => assert_eq!(code, 42),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The status code is outside 100..=999
    InvalidStatus(u16),
    /// A header name or value is not valid HTTP
    InvalidHeader(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::InvalidStatus(code) => write!(f, "invalid status code: {code}"),
            EnvelopeError::InvalidHeader(name) => write!(f, "invalid header: {name}"),
        }
    }
}

impl Error for EnvelopeError {}
