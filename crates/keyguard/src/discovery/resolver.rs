//! `jwks_uri` resolution from an OIDC well-known document

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::http::{ErrorCategory, ResilientFetcher};
use crate::json::{BoundedJsonDecoder, DecodeError};
use crate::security::{EventType, SecurityEventCounter};

/// Reasons a `jwks_uri` could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The discovery document could not be fetched
    #[error("Discovery fetch failed ({category}): {detail}")]
    Fetch {
        /// Fetch failure category
        category: ErrorCategory,
        /// Diagnostic detail
        detail: String,
    },

    /// The discovery document was rejected by the decoder
    #[error("Discovery document rejected: {0}")]
    Decode(#[from] DecodeError),

    /// The discovery document is valid JSON but not an object
    #[error("Discovery document is not a JSON object")]
    NotAnObject,

    /// `jwks_uri` is absent, not a string, or blank
    #[error("Discovery document has no jwks_uri")]
    MissingJwksUri,

    /// `jwks_uri` is not an absolute URL
    #[error("Invalid jwks_uri '{uri}': {reason}")]
    InvalidJwksUri {
        /// Raw value from the document
        uri: String,
        /// Parser message
        reason: String,
    },
}

/// Resolves the JWKS endpoint named by a well-known discovery document
///
/// Only `jwks_uri` is read; every other field is ignored. Each failed
/// resolution records one [`EventType::JwksUriResolutionFailed`] and fails
/// only the current load attempt.
#[derive(Debug, Clone)]
pub struct WellKnownResolver {
    fetcher: Arc<ResilientFetcher>,
    decoder: BoundedJsonDecoder,
    counter: Arc<SecurityEventCounter>,
    issuer: Arc<str>,
}

impl WellKnownResolver {
    /// Create a resolver
    pub fn new(
        fetcher: Arc<ResilientFetcher>,
        decoder: BoundedJsonDecoder,
        counter: Arc<SecurityEventCounter>,
        issuer: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            fetcher,
            decoder,
            counter,
            issuer: issuer.into(),
        }
    }

    /// Fetch `well_known_url` and return its `jwks_uri`
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if the document cannot be fetched or
    /// decoded, or lacks a usable `jwks_uri`.
    pub async fn resolve_jwks_uri(&self, well_known_url: &Url) -> Result<Url, ResolutionError> {
        let result = self.resolve(well_known_url).await;
        match &result {
            Ok(jwks_uri) => {
                debug!(
                    issuer = %self.issuer,
                    well_known_url = %well_known_url,
                    jwks_uri = %jwks_uri,
                    "Resolved jwks_uri"
                );
            }
            Err(e) => {
                warn!(
                    issuer = %self.issuer,
                    well_known_url = %well_known_url,
                    error = %e,
                    "Failed to resolve jwks_uri"
                );
                self.counter
                    .record(EventType::JwksUriResolutionFailed, Some(&*self.issuer));
            }
        }
        result
    }

    async fn resolve(&self, well_known_url: &Url) -> Result<Url, ResolutionError> {
        let fetched = self.fetcher.fetch(well_known_url, None).await;
        let body = match fetched.content {
            Some(body) if fetched.valid => body,
            _ => {
                return Err(ResolutionError::Fetch {
                    category: fetched
                        .error_category
                        .unwrap_or(ErrorCategory::InvalidContent),
                    detail: fetched.detail.unwrap_or_default(),
                });
            }
        };

        let document = self.decoder.decode(&body)?;
        extract_jwks_uri(&document)
    }
}

fn extract_jwks_uri(document: &Value) -> Result<Url, ResolutionError> {
    let object = document.as_object().ok_or(ResolutionError::NotAnObject)?;
    let raw = object
        .get("jwks_uri")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .ok_or(ResolutionError::MissingJwksUri)?;

    Url::parse(raw).map_err(|e| ResolutionError::InvalidJwksUri {
        uri: raw.to_string(),
        reason: e.to_string(),
    })
}
