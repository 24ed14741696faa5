//! Retry executor driven by the recovery classifier
//!
//! One attempt is: take a token, send, feed the response headers back to the limiter,
//! classify. Anything below 400 is returned as-is. Failures are retried while the decision
//! allows it, sleeping the decision's delay in between; the last failing response is
//! returned inside [`RetryError::Exhausted`] together with its decision.
//!
//! The circuit breaker itself lives elsewhere. Decisions that trip the circuit are forwarded
//! to an optional [`CircuitSignal`].

use crate::actor::LimiterHandle;
use crate::error::RetryError;
use async_trait::async_trait;
use backstop::{RecoveryDecision, ResponseEnvelope, classify};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Receives failures that should count against a circuit breaker
#[async_trait]
pub trait CircuitSignal: Send + Sync {
    async fn on_trip(&self, limiter: &str, decision: &RecoveryDecision);
}

/// Runs a request through a limiter with classifier-driven retries
///
/// # Example
///
/// ```
/// use backstop::ResponseEnvelope;
/// use backstop_runtime::{LimiterConfig, RateLimiterActor, Retrier};
///
/// # tokio_test::block_on(async {
/// let limiter = RateLimiterActor::spawn(LimiterConfig::new("api")).unwrap();
/// let retrier = Retrier::new(limiter);
///
/// let envelope = retrier
///     .execute(|| async {
///         // Send the request with your HTTP client here
///         ResponseEnvelope::builder(200).build().map_err(std::io::Error::other)
///     })
///     .await
///     .unwrap();
/// assert!(envelope.is_success());
/// # });
/// ```
#[derive(Clone)]
pub struct Retrier {
    limiter: LimiterHandle,
    acquire_timeout: Option<Duration>,
    circuit: Option<Arc<dyn CircuitSignal>>,
}

impl Retrier {
    pub fn new(limiter: LimiterHandle) -> Self {
        Self {
            limiter,
            acquire_timeout: None,
            circuit: None,
        }
    }

    /// Per-attempt acquire timeout; defaults to the limiter's own
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn with_circuit_signal(mut self, circuit: Arc<dyn CircuitSignal>) -> Self {
        self.circuit = Some(circuit);
        self
    }

    pub fn limiter(&self) -> &LimiterHandle {
        &self.limiter
    }

    /// Execute `send` until it yields a non-failure response or the decision says stop
    ///
    /// # Errors
    ///
    /// - [`RetryError::Exhausted`] with the last decision and response when retries run out
    ///   or the failure is not recoverable
    /// - [`RetryError::Limiter`] when no token could be acquired
    /// - [`RetryError::Transport`] when `send` itself fails; there is no status to classify,
    ///   so it is not retried
    pub async fn execute<F, Fut, E>(&self, mut send: F) -> Result<ResponseEnvelope, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ResponseEnvelope, E>>,
    {
        let name = self.limiter.name();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            self.limiter.acquire(self.acquire_timeout).await?;
            let envelope = send().await.map_err(RetryError::Transport)?;
            self.limiter.update_from_response(&envelope);

            if !envelope.is_failure() {
                return Ok(envelope);
            }

            let decision = classify(&envelope);

            if decision.trips_circuit {
                if let Some(circuit) = &self.circuit {
                    circuit.on_trip(name, &decision).await;
                }
            }

            if !decision.allows_attempt(attempt) {
                tracing::warn!(
                    limiter = %name,
                    status = decision.status,
                    attempts = attempt,
                    strategy = %decision.strategy,
                    severity = %decision.severity,
                    "Giving up on request"
                );
                return Err(RetryError::Exhausted {
                    limiter: name.to_string(),
                    attempts: attempt,
                    decision,
                    envelope,
                });
            }

            let delay = decision.retry_delay(attempt);
            tracing::debug!(
                limiter = %name,
                status = decision.status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                strategy = %decision.strategy,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
