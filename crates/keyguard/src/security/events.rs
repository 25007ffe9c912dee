//! Security event taxonomy and sinks
//!
//! Every security-relevant outcome in the key-loading and token-gate paths maps
//! to exactly one [`EventType`]. Counting happens in
//! [`SecurityEventCounter`](super::SecurityEventCounter); each increment is
//! also forwarded as a structured [`SecurityEvent`] to a [`SecurityEventSink`].
//!
//! ## Event Types
//!
//! - [`EventType::TokenEmpty`] - null, empty or blank token string
//! - [`EventType::TokenSizeExceeded`] - token larger than `max_token_size`
//! - [`EventType::JsonParseFailed`] - malformed JSON or a decoder limit violation
//! - [`EventType::ContentSizeExceeded`] - content above a strict size ceiling
//! - [`EventType::JwksLoadFailed`] - a fetch+parse attempt for a key set failed
//! - [`EventType::JwksCacheUnavailable`] - a load failed and no previous key set exists
//! - [`EventType::JwksUriResolutionFailed`] - well-known discovery failed
//! - [`EventType::KeyNotFound`] - a signature check needed a key that is not published
//!
//! ## Usage
//!
//! ```rust
//! use keyguard::security::{EventType, SecurityEvent, SecurityEventSink, TracingEventSink};
//!
//! let sink = TracingEventSink::default();
//! sink.emit(&SecurityEvent::now(EventType::JwksLoadFailed, Some("https://idp.example.com")));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Closed set of security-relevant events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Token string was absent, empty or whitespace only
    TokenEmpty,
    /// Token string exceeded the configured byte limit
    TokenSizeExceeded,
    /// JSON content could not be decoded within the configured limits
    JsonParseFailed,
    /// Content exceeded a strict content-size ceiling
    ContentSizeExceeded,
    /// Fetching or parsing a JWKS failed
    JwksLoadFailed,
    /// A JWKS load failed and there is no previously loaded key set to serve
    JwksCacheUnavailable,
    /// The `jwks_uri` could not be resolved from the well-known document
    JwksUriResolutionFailed,
    /// A key required for signature verification was not present
    KeyNotFound,
}

impl EventType {
    /// Number of event types
    pub const COUNT: usize = 8;

    /// All event types in declaration order
    pub const ALL: [EventType; Self::COUNT] = [
        EventType::TokenEmpty,
        EventType::TokenSizeExceeded,
        EventType::JsonParseFailed,
        EventType::ContentSizeExceeded,
        EventType::JwksLoadFailed,
        EventType::JwksCacheUnavailable,
        EventType::JwksUriResolutionFailed,
        EventType::KeyNotFound,
    ];

    /// Stable index into per-event storage
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Stable name used in logs and metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::TokenEmpty => "TOKEN_EMPTY",
            EventType::TokenSizeExceeded => "TOKEN_SIZE_EXCEEDED",
            EventType::JsonParseFailed => "JSON_PARSE_FAILED",
            EventType::ContentSizeExceeded => "CONTENT_SIZE_EXCEEDED",
            EventType::JwksLoadFailed => "JWKS_LOAD_FAILED",
            EventType::JwksCacheUnavailable => "JWKS_CACHE_UNAVAILABLE",
            EventType::JwksUriResolutionFailed => "JWKS_URI_RESOLUTION_FAILED",
            EventType::KeyNotFound => "KEY_NOT_FOUND",
        }
    }

    /// Severity the event is reported with
    pub const fn severity(self) -> EventSeverity {
        match self {
            EventType::JwksLoadFailed => EventSeverity::Error,
            EventType::TokenEmpty
            | EventType::TokenSizeExceeded
            | EventType::JsonParseFailed
            | EventType::ContentSizeExceeded
            | EventType::JwksCacheUnavailable
            | EventType::JwksUriResolutionFailed
            | EventType::KeyNotFound => EventSeverity::Warning,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational
    Info,
    /// Recoverable problem
    Warning,
    /// Failure of an operation
    Error,
}

/// A single occurrence of a security event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// What happened
    pub event_type: EventType,
    /// Logical issuer the event is attributed to, if any
    pub issuer: Option<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// Create an event stamped with the current time
    pub fn now(event_type: EventType, issuer: Option<&str>) -> Self {
        Self {
            event_type,
            issuer: issuer.map(str::to_owned),
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of structured security events
///
/// Implementations must be cheap and must not block; they run on the thread
/// that recorded the event.
pub trait SecurityEventSink: Send + Sync + fmt::Debug {
    /// Handle one event
    fn emit(&self, event: &SecurityEvent);
}

/// Sink that writes every event as a structured `tracing` record
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl SecurityEventSink for TracingEventSink {
    fn emit(&self, event: &SecurityEvent) {
        let issuer = event.issuer.as_deref().unwrap_or("-");
        let timestamp = event.timestamp.to_rfc3339();
        match event.event_type.severity() {
            EventSeverity::Info => info!(
                target: "keyguard::security",
                event_type = %event.event_type,
                issuer = %issuer,
                timestamp = %timestamp,
                "Security event"
            ),
            EventSeverity::Warning => warn!(
                target: "keyguard::security",
                event_type = %event.event_type,
                issuer = %issuer,
                timestamp = %timestamp,
                "Security event"
            ),
            EventSeverity::Error => error!(
                target: "keyguard::security",
                event_type = %event.event_type,
                issuer = %issuer,
                timestamp = %timestamp,
                "Security event"
            ),
        }
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Default)]
pub struct NoopEventSink;

impl SecurityEventSink for NoopEventSink {
    fn emit(&self, _event: &SecurityEvent) {}
}
