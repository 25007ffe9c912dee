//! Key sets and the key loader
//!
//! - [`keys`] - [`KeyInfo`], [`KeySet`] and [`parse_key_set`]
//! - [`status`] - the [`LoaderStatus`] state machine
//! - [`loader`] - [`KeyLoader`], which fetches, parses and publishes key sets

pub mod keys;
pub mod loader;
pub mod status;

pub use keys::{KeyInfo, KeySet, KeyType, parse_key_set};
pub use loader::{InitFuture, KeyLoader};
pub use status::{AtomicLoaderStatus, LoaderStatus};
