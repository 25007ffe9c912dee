//! Thread-safe tally of security events

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::events::{EventType, SecurityEvent, SecurityEventSink, TracingEventSink};

/// Monotonic per-event counters shared across a validation context
///
/// One counter is usually created per validation context and shared (via
/// `Arc`) with every key loader and token gate in that context. Increments are
/// atomic; counts are never decremented.
///
/// # Example
///
/// ```rust
/// use keyguard::security::{EventType, SecurityEventCounter};
///
/// let counter = SecurityEventCounter::new();
/// counter.increment(EventType::TokenEmpty);
/// assert_eq!(counter.count(EventType::TokenEmpty), 1);
/// ```
pub struct SecurityEventCounter {
    counts: [AtomicU64; EventType::COUNT],
    sink: Arc<dyn SecurityEventSink>,
}

impl SecurityEventCounter {
    /// Create a counter that reports events through `tracing`
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingEventSink))
    }

    /// Create a counter that reports events to a custom sink
    pub fn with_sink(sink: Arc<dyn SecurityEventSink>) -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            sink,
        }
    }

    /// Record an event without issuer attribution
    ///
    /// Returns the count after the increment.
    pub fn increment(&self, event: EventType) -> u64 {
        self.record(event, None)
    }

    /// Record an event attributed to an issuer
    ///
    /// Returns the count after the increment.
    pub fn record(&self, event: EventType, issuer: Option<&str>) -> u64 {
        let count = self.counts[event.index()].fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::record_security_event(event, issuer);
        self.sink.emit(&SecurityEvent::now(event, issuer));
        count
    }

    /// Current count for one event type
    pub fn count(&self, event: EventType) -> u64 {
        self.counts[event.index()].load(Ordering::Relaxed)
    }

    /// Sum over all event types
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Non-zero counts keyed by event type
    pub fn snapshot(&self) -> BTreeMap<EventType, u64> {
        EventType::ALL
            .iter()
            .filter_map(|&event| {
                let count = self.count(event);
                (count > 0).then_some((event, count))
            })
            .collect()
    }
}

impl Default for SecurityEventCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecurityEventCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityEventCounter")
            .field("counts", &self.snapshot())
            .field("sink", &self.sink)
            .finish()
    }
}
