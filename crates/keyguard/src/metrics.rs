//! Key-loading metrics for observability
//!
//! Enable with the `metrics` feature flag. Requires a `metrics` recorder
//! to be installed (e.g., via `metrics-exporter-prometheus`).
//!
//! ## Metrics Provided
//!
//! - `keyguard_security_events_total` - Counter for security events (labels: event_type, issuer)
//! - `keyguard_jwks_loads_total` - Counter for finished load attempts (labels: issuer, status)
//!
//! ## Example
//!
//! ```rust
//! use keyguard::init_metrics;
//!
//! // Initialize metric descriptions once at startup
//! init_metrics();
//! ```

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "metrics")]
use std::sync::Once;

use crate::jwks::LoaderStatus;
use crate::security::EventType;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Initialize metric descriptions. Call once at startup.
///
/// This function is idempotent - it's safe to call multiple times.
#[cfg(feature = "metrics")]
pub fn init_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "keyguard_security_events_total",
            "Total security events by type and issuer"
        );
        describe_counter!(
            "keyguard_jwks_loads_total",
            "Total finished JWKS load attempts by terminal status"
        );
    });
}

/// Record one security event
#[cfg(feature = "metrics")]
pub(crate) fn record_security_event(event: EventType, issuer: Option<&str>) {
    counter!(
        "keyguard_security_events_total",
        "event_type" => event.as_str(),
        "issuer" => issuer.unwrap_or("-").to_owned()
    )
    .increment(1);
}

/// Record the terminal status of a load attempt
#[cfg(feature = "metrics")]
pub(crate) fn record_jwks_load(issuer: &str, status: LoaderStatus) {
    counter!(
        "keyguard_jwks_loads_total",
        "issuer" => issuer.to_owned(),
        "status" => status.as_str()
    )
    .increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_security_event(_event: EventType, _issuer: Option<&str>) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_jwks_load(_issuer: &str, _status: LoaderStatus) {}
