//! # Backstop
//!
//! Rate-limit header parsing and response-driven recovery classification for HTTP API clients.
//!
//! ## Overview
//!
//! Backstop is the pure half of a client resilience layer. Given a completed HTTP exchange it
//! answers two questions without touching any shared state:
//! - **How much capacity does the provider say is left?** ([`RateLimitSnapshot`])
//! - **Should this failure be retried, when, and does it indicate a broken dependency?**
//!   ([`classify`] → [`RecoveryDecision`])
//!
//! The async token-bucket limiter that consumes these values lives in the `backstop-runtime`
//! crate.
//!
//! ## Quick Start
//!
//! ```
//! use backstop::{ResponseEnvelope, Strategy, classify};
//! use std::time::Duration;
//!
//! let envelope = ResponseEnvelope::builder(429)
//!     .header("retry-after", "10")
//!     .header("x-ratelimit-remaining", "0")
//!     .build()?;
//!
//! let decision = classify(&envelope);
//! assert!(decision.recoverable);
//! assert_eq!(decision.strategy, Strategy::WaitUntil);
//! assert_eq!(decision.retry_delay(1), Duration::from_secs(10));
//!
//! let snapshot = envelope.rate_limit().unwrap();
//! assert_eq!(snapshot.remaining, Some(0));
//! # Ok::<(), backstop::EnvelopeError>(())
//! ```
//!
//! ## Status Table
//!
//! | status | strategy | retry delay | attempts | trips circuit |
//! |--------|----------|-------------|----------|---------------|
//! | 408 | retry | 1s fixed | 3 | no |
//! | 429 | wait_until | `retry-after`, reset hint, or 5s..60s exponential | 5 | no |
//! | 500, other 5xx | retry_with_backoff | 1s..30s exponential | 3 | yes |
//! | 502, 503 | circuit_break | 1s..30s exponential | 3 | yes |
//! | 504 | retry | 1s fixed | 3 | yes |
//! | anything else | fail_fast | none | 1 | no |
//!
//! ## Features
//!
//! - `serde`: derive `Serialize`/`Deserialize` for [`Strategy`] and [`Severity`]

pub mod core;

pub use crate::core::{
    EnvelopeError, RateLimitSnapshot, RecoveryDecision, RecoveryPolicy, ResetHint,
    ResponseEnvelope, ResponseEnvelopeBuilder, RetryDelay, Severity, Strategy, Timing, classify,
    classify_status, policy_for,
};

pub use crate::core::snapshot::{
    LIMIT_HEADERS, REMAINING_HEADERS, RESET_HEADERS, RETRY_AFTER_HEADER,
};
