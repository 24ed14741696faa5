//! Token-bucket limiter actor
//!
//! Each limiter is a single tokio task that owns its bucket. Callers hold a cloneable
//! [`LimiterHandle`] and talk to the task over a channel; nothing else touches the state, so
//! there are no locks around it.
//!
//! The task waits on three things at once:
//! - its inbox (acquire, header sync, state reads, shutdown)
//! - the refill interval
//! - the earliest waiter deadline, so queued callers time out even if no refill tick comes
//!
//! None of the handlers await, so a slow caller can never stall other callers.

use crate::config::LimiterConfig;
use crate::error::{ConfigError, LimiterError};
use crate::types::StateSnapshot;
use backstop::{RateLimitSnapshot, ResponseEnvelope};
use http::HeaderMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

/// Deadline used when `now + timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Message types for the limiter actor
pub enum LimiterMessage {
    Acquire {
        timeout: Option<Duration>,
        response_tx: oneshot::Sender<Result<(), LimiterError>>,
    },
    Sync {
        snapshot: RateLimitSnapshot,
    },
    GetState {
        response_tx: oneshot::Sender<StateSnapshot>,
    },
    Shutdown,
}

/// Handle to communicate with a limiter actor
#[derive(Clone, Debug)]
pub struct LimiterHandle {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<LimiterMessage>,
}

impl LimiterHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for a token
    ///
    /// `timeout` falls back to the limiter's `default_wait_timeout_ms`. A zero timeout never
    /// queues: it either takes a token immediately or returns [`LimiterError::Timeout`].
    ///
    /// Dropping the returned future gives up the place in the queue without consuming a token.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<(), LimiterError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(LimiterMessage::Acquire {
                timeout,
                response_tx,
            })
            .map_err(|_| self.closed())?;

        response_rx.await.map_err(|_| self.closed())?
    }

    /// Fold the rate-limit headers of a response into the bucket; returns immediately
    pub fn update_from_response(&self, envelope: &ResponseEnvelope) {
        if let Some(snapshot) = envelope.rate_limit() {
            self.sync(snapshot);
        }
    }

    /// Fold raw rate-limit headers into the bucket; returns immediately
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        if let Some(snapshot) = RateLimitSnapshot::from_headers(headers) {
            self.sync(snapshot);
        }
    }

    /// Apply an already-parsed snapshot; returns immediately
    pub fn sync(&self, snapshot: RateLimitSnapshot) {
        if self.tx.send(LimiterMessage::Sync { snapshot }).is_err() {
            tracing::debug!(limiter = %self.name, "Dropping rate-limit update for stopped limiter");
        }
    }

    /// Read the current state
    pub async fn get_state(&self) -> Result<StateSnapshot, LimiterError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(LimiterMessage::GetState { response_tx })
            .map_err(|_| self.closed())?;

        response_rx.await.map_err(|_| self.closed())
    }

    /// Stop the actor; queued and future callers get [`LimiterError::Closed`]
    pub fn shutdown(&self) {
        let _ = self.tx.send(LimiterMessage::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn closed(&self) -> LimiterError {
        LimiterError::Closed {
            name: self.name.to_string(),
        }
    }
}

/// The limiter actor
pub struct RateLimiterActor;

impl RateLimiterActor {
    /// Validate `config` and spawn a limiter with a full bucket
    ///
    /// Must be called from within a tokio runtime. The actor runs until [`LimiterHandle::shutdown`]
    /// is called or every handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn spawn(config: LimiterConfig) -> Result<LimiterHandle, ConfigError> {
        config.validate()?;

        let name: Arc<str> = Arc::from(config.name.as_str());
        let (tx, rx) = mpsc::unbounded_channel();
        let state = LimiterState::new(Arc::clone(&name), &config);

        tracing::info!(
            limiter = %name,
            bucket_size = config.bucket_size,
            refill_rate = config.refill_rate,
            refill_interval_ms = config.refill_interval_ms,
            "Starting rate limiter"
        );

        tokio::spawn(run_actor(rx, state));

        Ok(LimiterHandle { name, tx })
    }
}

struct Waiter {
    id: u64,
    deadline: Instant,
    timeout: Duration,
    response_tx: oneshot::Sender<Result<(), LimiterError>>,
}

struct LimiterState {
    name: Arc<str>,
    bucket_size: u64,
    tokens: u64,
    refill_rate: u64,
    refill_interval: Duration,
    default_wait_timeout: Duration,
    observed_limit: Option<u64>,
    observed_remaining: Option<u64>,
    observed_reset: Option<u64>,
    waiting: VecDeque<Waiter>,
    // May hold entries for waiters already served; those only cause an early wake-up
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    next_waiter_id: u64,
    acquired_total: u64,
    timeouts_total: u64,
}

impl LimiterState {
    fn new(name: Arc<str>, config: &LimiterConfig) -> Self {
        LimiterState {
            name,
            bucket_size: config.bucket_size,
            tokens: config.bucket_size,
            refill_rate: config.refill_rate,
            refill_interval: config.refill_interval(),
            default_wait_timeout: config.default_wait_timeout(),
            observed_limit: None,
            observed_remaining: None,
            observed_reset: None,
            waiting: VecDeque::new(),
            deadlines: BinaryHeap::new(),
            next_waiter_id: 0,
            acquired_total: 0,
            timeouts_total: 0,
        }
    }

    fn handle(&mut self, msg: LimiterMessage, now: Instant) {
        match msg {
            LimiterMessage::Acquire {
                timeout,
                response_tx,
            } => self.acquire(timeout, response_tx, now),
            LimiterMessage::Sync { snapshot } => self.sync(snapshot),
            LimiterMessage::GetState { response_tx } => {
                self.prune_abandoned();
                // Ignore send errors - the reader may have given up
                let _ = response_tx.send(self.snapshot());
            }
            LimiterMessage::Shutdown => {}
        }
    }

    fn acquire(
        &mut self,
        timeout: Option<Duration>,
        response_tx: oneshot::Sender<Result<(), LimiterError>>,
        now: Instant,
    ) {
        // Tokens are only left over once the queue is empty, so this cannot jump the line
        if self.tokens > 0 && self.waiting.is_empty() {
            self.grant(response_tx);
            return;
        }

        let timeout = timeout.unwrap_or(self.default_wait_timeout);
        if timeout.is_zero() {
            self.timeouts_total += 1;
            let _ = response_tx.send(Err(self.timeout_error(timeout)));
            return;
        }

        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);

        self.deadlines.push(Reverse((deadline, id)));
        self.waiting.push_back(Waiter {
            id,
            deadline,
            timeout,
            response_tx,
        });

        tracing::debug!(
            limiter = %self.name,
            waiter = id,
            waiting = self.waiting.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Bucket empty, queueing caller"
        );
    }

    /// Hand one token to a caller; a caller that already left costs nothing
    fn grant(&mut self, response_tx: oneshot::Sender<Result<(), LimiterError>>) -> bool {
        if response_tx.send(Ok(())).is_err() {
            return false;
        }

        self.tokens -= 1;
        self.acquired_total += 1;
        tracing::trace!(limiter = %self.name, tokens = self.tokens, "Token granted");
        true
    }

    fn refill(&mut self, now: Instant) {
        self.tokens = self
            .tokens
            .saturating_add(self.refill_rate)
            .min(self.bucket_size);
        self.serve_waiters(now);
    }

    /// Serve the queue head-first while tokens last, expiring lapsed waiters on the way
    ///
    /// A waiter whose deadline is exactly `now` is still served if a token is available.
    fn serve_waiters(&mut self, now: Instant) {
        while let Some(waiter) = self.waiting.pop_front() {
            if waiter.deadline < now {
                self.expire(waiter);
                continue;
            }
            if waiter.response_tx.is_closed() {
                continue;
            }
            if self.tokens == 0 {
                self.waiting.push_front(waiter);
                break;
            }

            let id = waiter.id;
            if self.grant(waiter.response_tx) {
                tracing::debug!(limiter = %self.name, waiter = id, "Served queued caller");
            }
        }

        self.expire_due(now);
    }

    /// Time out every waiter whose deadline has been reached, wherever it sits in the queue
    fn expire_due(&mut self, now: Instant) {
        while let Some(&Reverse((deadline, id))) = self.deadlines.peek() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();

            // The queue is ordered by id; a miss means the waiter already left
            if let Ok(index) = self.waiting.binary_search_by_key(&id, |w| w.id) {
                if let Some(waiter) = self.waiting.remove(index) {
                    self.expire(waiter);
                }
            }
        }
    }

    /// Drop waiters whose callers stopped listening
    fn prune_abandoned(&mut self) {
        self.waiting.retain(|w| !w.response_tx.is_closed());
    }

    fn expire(&mut self, waiter: Waiter) {
        self.timeouts_total += 1;
        tracing::debug!(
            limiter = %self.name,
            waiter = waiter.id,
            timeout_ms = waiter.timeout.as_millis() as u64,
            "Queued caller timed out"
        );
        let _ = waiter
            .response_tx
            .send(Err(self.timeout_error(waiter.timeout)));
    }

    /// Take the provider's word for remaining capacity; never grants tokens
    fn sync(&mut self, snapshot: RateLimitSnapshot) {
        if let Some(limit) = snapshot.limit {
            self.observed_limit = Some(limit);
        }
        if let Some(reset) = snapshot.reset {
            self.observed_reset = Some(reset.raw());
        }

        if let Some(remaining) = snapshot.remaining {
            self.observed_remaining = Some(remaining);

            let capped = self.tokens.min(remaining).min(self.bucket_size);
            if capped < self.tokens {
                tracing::debug!(
                    limiter = %self.name,
                    from = self.tokens,
                    to = capped,
                    "Provider reports less capacity, lowering tokens"
                );
                self.tokens = capped;
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((deadline, _))| *deadline)
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            name: self.name.to_string(),
            tokens: self.tokens,
            bucket_size: self.bucket_size,
            observed_limit: self.observed_limit,
            observed_remaining: self.observed_remaining,
            observed_reset: self.observed_reset,
            waiting_count: self.waiting.len(),
            acquired_total: self.acquired_total,
            timeouts_total: self.timeouts_total,
        }
    }

    /// Fail every queued caller with `Closed`
    fn close(&mut self) {
        for waiter in self.waiting.drain(..) {
            let _ = waiter.response_tx.send(Err(LimiterError::Closed {
                name: self.name.to_string(),
            }));
        }
        self.deadlines.clear();
    }

    fn timeout_error(&self, waited: Duration) -> LimiterError {
        LimiterError::Timeout {
            name: self.name.to_string(),
            waited,
        }
    }
}

async fn run_actor(mut rx: mpsc::UnboundedReceiver<LimiterMessage>, mut state: LimiterState) {
    let start = Instant::now() + state.refill_interval;
    let mut ticker = time::interval_at(start, state.refill_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let next_deadline = state.next_deadline();

        // The tick goes first so a waiter whose deadline falls on it gets the new token
        tokio::select! {
            biased;
            _ = ticker.tick() => state.refill(Instant::now()),
            msg = rx.recv() => match msg {
                Some(LimiterMessage::Shutdown) | None => break,
                Some(msg) => state.handle(msg, Instant::now()),
            },
            _ = sleep_until(next_deadline) => state.expire_due(Instant::now()),
        }
    }

    state.close();
    tracing::info!(limiter = %state.name, "Rate limiter actor shutting down");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
