//! # Backstop Runtime
//!
//! Client-side rate limiting and retries for code that calls rate-limited HTTP APIs.
//!
//! ## Purpose
//!
//! Providers such as GitHub or Slack publish their remaining quota in response headers and
//! answer with `429` once it is gone. This crate keeps a local token bucket per API so
//! callers slow down *before* the provider pushes back, and lets the provider's headers
//! pull the bucket down when the local estimate is too optimistic:
//!
//! - **Token-bucket limiter actor** that queues callers in FIFO order with per-call deadlines
//! - **Header sync** that only ever lowers the local token count
//! - **Limiter registry** that routes by bucket name
//! - **Retrier** that classifies each failure with [`backstop::classify`] and waits accordingly
//!
//! ## Quick Start
//!
//! ```
//! use backstop::ResponseEnvelope;
//! use backstop_runtime::{LimiterConfig, RateLimiterActor};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiterActor::spawn(
//!     LimiterConfig::new("github")
//!         .bucket_size(5)
//!         .refill_rate(1)
//!         .refill_interval_ms(1_000),
//! )
//! .unwrap();
//!
//! limiter.acquire(Some(Duration::from_secs(2))).await.unwrap();
//!
//! // The provider says only two calls are left; the bucket follows
//! let response = ResponseEnvelope::builder(200)
//!     .header("x-ratelimit-remaining", "2")
//!     .build()
//!     .unwrap();
//! limiter.update_from_response(&response);
//!
//! let state = limiter.get_state().await.unwrap();
//! assert_eq!(state.tokens, 2);
//! # });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  acquire / sync / get_state  ┌───────────────┐
//! │ Retrier  ├─────────────────────────────►│ LimiterHandle │
//! └────┬─────┘                              └───────┬───────┘
//!      │ classify                                   │ mpsc
//! ┌────▼─────┐                              ┌───────▼───────┐
//! │ backstop │                              │  Actor task   │
//! │   core   │                              │ (bucket, FIFO │
//! └──────────┘                              │  waiters,     │
//!                                           │  refill tick) │
//!                                           └───────────────┘
//! ```
//!
//! ## Configuration
//!
//! Limiters can be listed in a settings file and loaded with [`Settings::load`], see
//! [`config`] for the format. The `backstop` binary uses the same settings:
//!
//! ```bash
//! backstop --config limiters.toml simulate --limiter github --callers 50
//! backstop classify --status 503
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
pub mod types;

#[cfg(test)]
mod actor_tests;

pub use actor::{LimiterHandle, LimiterMessage, RateLimiterActor};
pub use config::{LimiterConfig, Settings};
pub use error::{ConfigError, LimiterError, RetryError};
pub use registry::LimiterRegistry;
pub use retry::{CircuitSignal, Retrier};
pub use types::{DecisionReport, StateSnapshot};
