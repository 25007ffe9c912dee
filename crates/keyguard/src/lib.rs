//! # Keyguard - JWKS Loading and Secure Decoding
//!
//! Key loading for OAuth 2.0 / OpenID Connect bearer-token validation: locate
//! an issuer's JSON Web Key Set, fetch it, decode it under strict resource
//! limits, keep the usable verification keys and serve them lock-free to the
//! signature-verification step.
//!
//! ## Design Principles
//!
//! - **Untrusted input is bounded**: token strings and JSON documents are checked
//!   against [`config::ParserLimits`] before and during decoding
//! - **Failures are events, not crashes**: load problems end in
//!   [`jwks::LoaderStatus::Error`] and are counted in a [`security::SecurityEventCounter`]
//! - **Stale beats empty**: a failed reload keeps the last good key set queryable
//! - **One load at a time**: concurrent initialization converges on a single fetch
//!
//! ## Architecture
//!
//! - [`config`] - Limits, HTTP settings, key sources and loader configuration
//! - [`token`] - Pre-pipeline token string gate
//! - [`json`] - Bounded JSON decoder
//! - [`http`] - Transport seam, reqwest transport and resilient fetcher
//! - [`discovery`] - `jwks_uri` resolution from well-known documents
//! - [`jwks`] - Key material model, status machine and [`jwks::KeyLoader`]
//! - [`security`] - Event taxonomy, sinks and the shared counter
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use keyguard::config::LoaderConfig;
//! use keyguard::jwks::{KeyLoader, LoaderStatus};
//! use keyguard::security::SecurityEventCounter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = LoaderConfig::builder()
//!     .jwks_content(r#"{"keys":[{"kty":"OKP","crv":"Ed25519","kid":"k1","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}]}"#)
//!     .issuer_identifier("https://idp.example.com")
//!     .build()
//!     .unwrap();
//!
//! let loader = KeyLoader::new(config);
//! let counter = Arc::new(SecurityEventCounter::new());
//!
//! assert_eq!(loader.initialize(counter).await, LoaderStatus::Ok);
//! assert!(loader.get_key_info("k1").is_some());
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - Record security events and load outcomes with the `metrics` crate

pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod json;
pub mod jwks;
pub mod metrics;
pub mod security;
pub mod token;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use config::{LoaderConfig, ParserLimits};

#[doc(inline)]
pub use jwks::{KeyInfo, KeyLoader, KeySet, LoaderStatus};

#[doc(inline)]
pub use security::{EventType, SecurityEventCounter};

#[doc(inline)]
pub use token::TokenStringValidator;

pub use crate::metrics::init_metrics;
