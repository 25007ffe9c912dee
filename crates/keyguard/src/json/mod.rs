//! Bounded decoding of untrusted JSON content
//!
//! Discovery documents and key sets are decoded with [`BoundedJsonDecoder`],
//! which enforces [`crate::config::ParserLimits`] during decoding and reports
//! every rejection to the shared [`crate::security::SecurityEventCounter`].

pub mod decoder;

pub use decoder::{BoundedJsonDecoder, DecodeError, LimitViolation};
