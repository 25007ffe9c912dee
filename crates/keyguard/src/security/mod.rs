//! Security event accounting
//!
//! - [`events`] - the closed [`EventType`] taxonomy, [`SecurityEvent`] records and sinks
//! - [`counter`] - [`SecurityEventCounter`], the shared atomic tally

pub mod counter;
pub mod events;

pub use counter::SecurityEventCounter;
pub use events::{
    EventSeverity, EventType, NoopEventSink, SecurityEvent, SecurityEventSink, TracingEventSink,
};
