//! Pre-pipeline token string gate
//!
//! Cheap checks that run before any decoding: a token must be present,
//! non-blank and no larger than `max_token_size` bytes (UTF-8). The token is
//! never parsed here.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ParserLimits;
use crate::security::{EventType, SecurityEventCounter};

/// Token gate failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token was absent, empty or whitespace only
    #[error("Token is empty")]
    Empty,

    /// Token exceeded the byte limit
    #[error("Token size exceeds limit: {actual} bytes > {max} bytes")]
    SizeExceeded {
        /// Actual size in bytes
        actual: usize,
        /// Maximum allowed
        max: usize,
    },
}

impl TokenError {
    /// Security event this failure is counted as
    pub fn event_type(&self) -> EventType {
        match self {
            TokenError::Empty => EventType::TokenEmpty,
            TokenError::SizeExceeded { .. } => EventType::TokenSizeExceeded,
        }
    }
}

/// Validates raw token strings before they enter the validation pipeline
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use keyguard::config::ParserLimits;
/// use keyguard::security::{EventType, SecurityEventCounter};
/// use keyguard::token::{TokenError, TokenStringValidator};
///
/// let counter = Arc::new(SecurityEventCounter::new());
/// let gate = TokenStringValidator::new(ParserLimits::default(), counter.clone());
///
/// assert!(gate.validate(Some("eyJhbGciOiJSUzI1NiJ9.e30.c2ln")).is_ok());
/// assert_eq!(gate.validate(Some("   ")), Err(TokenError::Empty));
/// assert_eq!(counter.count(EventType::TokenEmpty), 1);
/// ```
#[derive(Debug, Clone)]
pub struct TokenStringValidator {
    max_token_size: usize,
    counter: Arc<SecurityEventCounter>,
}

impl TokenStringValidator {
    /// Create a gate using `limits.max_token_size`
    pub fn new(limits: ParserLimits, counter: Arc<SecurityEventCounter>) -> Self {
        Self {
            max_token_size: limits.max_token_size,
            counter,
        }
    }

    /// Check a raw token string
    ///
    /// Each failing call increments exactly one counter entry.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Empty`] for `None`, `""` or whitespace-only input
    /// - [`TokenError::SizeExceeded`] when the UTF-8 length is above the limit
    ///   (a token of exactly `max_token_size` bytes is accepted)
    pub fn validate(&self, token: Option<&str>) -> Result<(), TokenError> {
        let result = match token {
            None => Err(TokenError::Empty),
            Some(raw) if raw.trim().is_empty() => Err(TokenError::Empty),
            Some(raw) if raw.len() > self.max_token_size => Err(TokenError::SizeExceeded {
                actual: raw.len(),
                max: self.max_token_size,
            }),
            Some(_) => Ok(()),
        };

        if let Err(error) = &result {
            debug!(error = %error, "Token rejected before parsing");
            self.counter.increment(error.event_type());
        }
        result
    }
}
