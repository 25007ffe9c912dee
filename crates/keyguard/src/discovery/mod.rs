//! OIDC well-known discovery
//!
//! Only the subset needed to locate a key set: the `jwks_uri` field of the
//! discovery document.

pub mod resolver;

pub use resolver::{ResolutionError, WellKnownResolver};
