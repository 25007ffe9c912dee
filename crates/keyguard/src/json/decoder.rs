//! Size- and depth-bounded JSON decoding
//!
//! Limits are enforced while the document is being decoded, not after the
//! fact: the total size is checked before the parser starts, string length,
//! nesting depth and element counts are checked as each value is produced.
//! A violation aborts decoding; no partial value is ever returned.

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ParserLimits;
use crate::security::{EventType, SecurityEventCounter};

/// A structural limit that was exceeded during decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitViolation {
    /// A string (value or object key) was longer than `max_string_size`
    StringTooLong {
        /// Length of the offending string in bytes
        actual: usize,
        /// Configured maximum
        max: usize,
    },
    /// Nesting went deeper than `max_depth`
    DepthExceeded {
        /// Configured maximum
        max: usize,
    },
    /// An array or object had more than `max_array_size` elements
    TooManyElements {
        /// Configured maximum
        max: usize,
    },
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringTooLong { actual, max } => {
                write!(f, "string too long: {} bytes (max: {})", actual, max)
            }
            Self::DepthExceeded { max } => write!(f, "nesting depth exceeds {}", max),
            Self::TooManyElements { max } => write!(f, "more than {} elements", max),
        }
    }
}

/// Decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Content exceeded the strict content-size ceiling
    #[error("Content size exceeds ceiling: {actual} bytes > {max} bytes")]
    ContentSizeExceeded {
        /// Content size in bytes
        actual: usize,
        /// Configured ceiling
        max: usize,
    },

    /// Content exceeded `max_buffer_size`
    #[error("Content exceeds buffer limit: {actual} bytes > {max} bytes")]
    BufferExceeded {
        /// Content size in bytes
        actual: usize,
        /// Configured maximum
        max: usize,
    },

    /// A structural limit was exceeded
    #[error("JSON limit exceeded: {0}")]
    LimitExceeded(LimitViolation),

    /// The content is not well-formed JSON
    #[error("Malformed JSON: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Security event this failure is counted as
    pub fn event_type(&self) -> EventType {
        match self {
            DecodeError::ContentSizeExceeded { .. } => EventType::ContentSizeExceeded,
            DecodeError::BufferExceeded { .. }
            | DecodeError::LimitExceeded(_)
            | DecodeError::Malformed(_) => EventType::JsonParseFailed,
        }
    }

    /// Whether the failure came from a resource limit rather than syntax
    pub fn is_limit_violation(&self) -> bool {
        !matches!(self, DecodeError::Malformed(_))
    }
}

/// JSON decoder that enforces [`ParserLimits`]
///
/// Every failed decode increments exactly one counter entry
/// ([`EventType::ContentSizeExceeded`] for the strict ceiling,
/// [`EventType::JsonParseFailed`] otherwise). The counter's sink emits the
/// single warn-level record; the decoder itself only adds debug detail.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use keyguard::config::ParserLimits;
/// use keyguard::json::BoundedJsonDecoder;
/// use keyguard::security::SecurityEventCounter;
///
/// let decoder = BoundedJsonDecoder::new(ParserLimits::default(), Arc::new(SecurityEventCounter::new()));
/// let value = decoder.decode(br#"{"keys":[]}"#).unwrap();
/// assert!(value["keys"].is_array());
/// ```
#[derive(Debug, Clone)]
pub struct BoundedJsonDecoder {
    limits: ParserLimits,
    content_size_ceiling: Option<usize>,
    counter: Arc<SecurityEventCounter>,
    issuer: Option<Arc<str>>,
}

impl BoundedJsonDecoder {
    /// Create a decoder
    pub fn new(limits: ParserLimits, counter: Arc<SecurityEventCounter>) -> Self {
        Self {
            limits,
            content_size_ceiling: None,
            counter,
            issuer: None,
        }
    }

    /// Reject content above `max` bytes as [`DecodeError::ContentSizeExceeded`]
    pub fn with_content_size_ceiling(mut self, max: usize) -> Self {
        self.content_size_ceiling = Some(max);
        self
    }

    /// Attribute recorded events to an issuer
    pub fn with_issuer(mut self, issuer: impl Into<Arc<str>>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Limits in effect
    pub fn limits(&self) -> &ParserLimits {
        &self.limits
    }

    /// The canonical empty value (an empty object)
    pub fn empty_value() -> Value {
        Value::Object(Map::new())
    }

    /// Decode raw bytes into any JSON value
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] on a size/limit violation or malformed input.
    pub fn decode(&self, raw: &[u8]) -> Result<Value, DecodeError> {
        let result = self.decode_inner(raw);
        if let Err(error) = &result {
            debug!(
                target: "keyguard::json",
                issuer = self.issuer.as_deref().unwrap_or("-"),
                size = raw.len(),
                error = %error,
                "Rejected JSON content"
            );
            self.counter.record(error.event_type(), self.issuer.as_deref());
        }
        result
    }

    /// Decode a string into any JSON value
    ///
    /// # Errors
    ///
    /// Same as [`BoundedJsonDecoder::decode`].
    pub fn decode_str(&self, raw: &str) -> Result<Value, DecodeError> {
        self.decode(raw.as_bytes())
    }

    /// Decode, returning `None` on any failure
    ///
    /// Failures are still counted and logged.
    pub fn decode_best_effort(&self, raw: &[u8]) -> Option<Value> {
        self.decode(raw).ok()
    }

    /// Decode an object, falling back to [`BoundedJsonDecoder::empty_value`]
    ///
    /// Non-object top-level values are replaced by the empty object as well.
    pub fn decode_object_or_empty(&self, raw: &[u8]) -> Value {
        match self.decode_best_effort(raw) {
            Some(value @ Value::Object(_)) => value,
            _ => Self::empty_value(),
        }
    }

    fn decode_inner(&self, raw: &[u8]) -> Result<Value, DecodeError> {
        if let Some(max) = self.content_size_ceiling
            && raw.len() > max
        {
            return Err(DecodeError::ContentSizeExceeded {
                actual: raw.len(),
                max,
            });
        }
        if raw.len() > self.limits.max_buffer_size {
            return Err(DecodeError::BufferExceeded {
                actual: raw.len(),
                max: self.limits.max_buffer_size,
            });
        }

        let guard = Guard {
            limits: self.limits,
            violation: Cell::new(None),
        };
        let mut deserializer = serde_json::Deserializer::from_slice(raw);
        let value = ValueSeed {
            guard: &guard,
            depth: 0,
        }
        .deserialize(&mut deserializer)
        .and_then(|value| deserializer.end().map(|()| value));

        match (value, guard.violation.get()) {
            (_, Some(violation)) => Err(DecodeError::LimitExceeded(violation)),
            (Ok(value), None) => Ok(value),
            (Err(e), None) => Err(DecodeError::Malformed(e.to_string())),
        }
    }
}

/// Limit bookkeeping shared by all seeds of one decode call
struct Guard {
    limits: ParserLimits,
    violation: Cell<Option<LimitViolation>>,
}

impl Guard {
    fn fail<E: de::Error>(&self, violation: LimitViolation) -> E {
        self.violation.set(Some(violation));
        E::custom(violation)
    }

    fn check_string<E: de::Error>(&self, len: usize) -> Result<(), E> {
        if len > self.limits.max_string_size {
            return Err(self.fail(LimitViolation::StringTooLong {
                actual: len,
                max: self.limits.max_string_size,
            }));
        }
        Ok(())
    }

    fn enter<E: de::Error>(&self, depth: usize) -> Result<usize, E> {
        let next = depth + 1;
        if next > self.limits.max_depth {
            return Err(self.fail(LimitViolation::DepthExceeded {
                max: self.limits.max_depth,
            }));
        }
        Ok(next)
    }

    fn check_room<E: de::Error>(&self, len: usize) -> Result<(), E> {
        if len >= self.limits.max_array_size {
            return Err(self.fail(LimitViolation::TooManyElements {
                max: self.limits.max_array_size,
            }));
        }
        Ok(())
    }
}

struct ValueSeed<'g> {
    guard: &'g Guard,
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor {
            guard: self.guard,
            depth: self.depth,
        })
    }
}

struct ValueVisitor<'g> {
    guard: &'g Guard,
    depth: usize,
}

impl<'de> Visitor<'de> for ValueVisitor<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        self.guard.check_string(v.len())?;
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        self.guard.check_string(v.len())?;
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let depth = self.guard.enter(self.depth)?;
        let mut values = Vec::new();
        loop {
            let next = seq.next_element_seed(ValueSeed {
                guard: self.guard,
                depth,
            })?;
            let Some(value) = next else { break };
            self.guard.check_room(values.len())?;
            values.push(value);
        }
        Ok(Value::Array(values))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let depth = self.guard.enter(self.depth)?;
        let mut object = Map::new();
        while let Some(key) = map.next_key_seed(KeySeed { guard: self.guard })? {
            self.guard.check_room(object.len())?;
            let value = map.next_value_seed(ValueSeed {
                guard: self.guard,
                depth,
            })?;
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}

struct KeySeed<'g> {
    guard: &'g Guard,
}

impl<'de> DeserializeSeed<'de> for KeySeed<'_> {
    type Value = String;

    fn deserialize<D>(self, deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(self)
    }
}

impl<'de> Visitor<'de> for KeySeed<'_> {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object key")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        self.guard.check_string(v.len())?;
        Ok(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        self.guard.check_string(v.len())?;
        Ok(v)
    }
}
