//! Immutable wrapper around a completed HTTP exchange
//!
//! A [`ResponseEnvelope`] is what the transport hands back after an attempt. Everything else in
//! the crate reads from it: the snapshot parser looks at its headers, the classifier at its
//! status and, for 429, at its `retry-after` and reset headers.
//!
//! Header lookups are case-insensitive. When the same header appears more than once, the last
//! value wins.

use super::EnvelopeError;
use super::snapshot::{self, RateLimitSnapshot};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::time::{Duration, SystemTime};

/// When the request left and when the response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub sent_at: SystemTime,
    pub received_at: SystemTime,
}

impl Timing {
    pub fn new(sent_at: SystemTime, received_at: SystemTime) -> Self {
        Timing {
            sent_at,
            received_at,
        }
    }

    /// A zero-length exchange observed at `at`
    pub fn at(at: SystemTime) -> Self {
        Timing::new(at, at)
    }

    pub fn now() -> Self {
        Timing::at(SystemTime::now())
    }

    /// Round-trip time, zero if the clock went backwards
    pub fn elapsed(&self) -> Duration {
        self.received_at
            .duration_since(self.sent_at)
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing::now()
    }
}

/// A completed HTTP exchange: status, headers, body and timing
///
/// # Example
///
/// ```
/// use backstop::ResponseEnvelope;
///
/// let envelope = ResponseEnvelope::builder(503)
///     .header("X-RateLimit-Remaining", "12")
///     .body("upstream unavailable")
///     .build()
///     .unwrap();
///
/// assert_eq!(envelope.status_code(), 503);
/// assert_eq!(envelope.header("x-ratelimit-remaining"), Some("12"));
/// assert!(envelope.is_failure());
/// ```
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    timing: Timing,
}

impl ResponseEnvelope {
    /// Start building an envelope for `status`
    pub fn builder(status: u16) -> ResponseEnvelopeBuilder {
        ResponseEnvelopeBuilder::new(status)
    }

    /// Wrap an `http::Response`, collapsing repeated headers to their last value
    pub fn from_http<B: Into<Bytes>>(response: http::Response<B>, timing: Timing) -> Self {
        let (parts, body) = response.into_parts();
        ResponseEnvelope {
            status: parts.status,
            headers: last_write_wins(parts.headers),
            body: body.into(),
            timing,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup; `None` if absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 4xx, 5xx, or a nonstandard status of 600 and above
    pub fn is_failure(&self) -> bool {
        self.status.as_u16() >= 400
    }

    /// Provider-reported capacity, `None` when no rate-limit header is present
    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        RateLimitSnapshot::from_headers(&self.headers)
    }

    /// The `retry-after` header as a duration (integer seconds only)
    pub fn retry_after(&self) -> Option<Duration> {
        snapshot::retry_after(&self.headers)
    }
}

/// Builder for [`ResponseEnvelope`]
///
/// Validation is deferred to [`build`](ResponseEnvelopeBuilder::build) so calls can be chained;
/// the first invalid input is the one reported.
#[derive(Debug)]
pub struct ResponseEnvelopeBuilder {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    timing: Option<Timing>,
    error: Option<EnvelopeError>,
}

impl ResponseEnvelopeBuilder {
    fn new(status: u16) -> Self {
        ResponseEnvelopeBuilder {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timing: None,
            error: None,
        }
    }

    /// Set a header, replacing any earlier value for the same name
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        let name_parsed = HeaderName::from_bytes(name.as_bytes());
        let value_parsed = HeaderValue::from_str(value);
        match (name_parsed, value_parsed) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => self.error = Some(EnvelopeError::InvalidHeader(name.to_string())),
        }
        self
    }

    /// Merge a whole header map; repeated names collapse to their last value
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in last_write_wins(headers) {
            if let Some(name) = name {
                self.headers.insert(name, value);
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn received_at(mut self, at: SystemTime) -> Self {
        self.timing = Some(Timing::at(at));
        self
    }

    /// Finish the envelope
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::InvalidStatus`] if the status is outside 100..=999
    /// - [`EnvelopeError::InvalidHeader`] if any header name or value was rejected
    pub fn build(self) -> Result<ResponseEnvelope, EnvelopeError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let status =
            StatusCode::from_u16(self.status).map_err(|_| EnvelopeError::InvalidStatus(self.status))?;

        Ok(ResponseEnvelope {
            status,
            headers: self.headers,
            body: self.body,
            timing: self.timing.unwrap_or_default(),
        })
    }
}

fn last_write_wins(headers: HeaderMap) -> HeaderMap {
    let mut collapsed = HeaderMap::with_capacity(headers.keys_len());
    let mut current: Option<HeaderName> = None;

    // Continuation values of a repeated header come back with no name
    for (name, value) in headers {
        if let Some(name) = name {
            current = Some(name);
        }
        if let Some(name) = &current {
            collapsed.insert(name.clone(), value);
        }
    }

    collapsed
}
