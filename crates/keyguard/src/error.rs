//! Crate-level error type

use thiserror::Error;

use crate::config::ConfigError;
use crate::discovery::ResolutionError;
use crate::json::DecodeError;
use crate::token::TokenError;

/// Result type for keyguard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by keyguard
///
/// Load failures inside [`crate::jwks::KeyLoader`] never surface here; they
/// end the load attempt in `ERROR` and are reported as security events.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    /// Token string rejected by the pre-pipeline gate
    #[error(transparent)]
    Token(#[from] TokenError),

    /// JSON content rejected by the bounded decoder
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Well-known discovery failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl Error {
    /// Security event associated with this error, if any
    pub fn event_type(&self) -> Option<crate::security::EventType> {
        match self {
            Error::Token(e) => Some(e.event_type()),
            Error::Decode(e) => Some(e.event_type()),
            Error::Resolution(_) => Some(crate::security::EventType::JwksUriResolutionFailed),
            Error::Config(_) | Error::HttpClient(_) => None,
        }
    }
}
