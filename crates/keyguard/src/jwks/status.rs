//! Loader status state machine
//!
//! ```text
//! UNDEFINED ──► LOADING ──► OK
//!                  ▲    └─► ERROR
//!                  └── OK | ERROR   (re-initialization)
//! ```
//!
//! `UNDEFINED` is only ever the initial value; no transition leads back to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Status of a [`crate::jwks::KeyLoader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum LoaderStatus {
    /// Never initialized
    Undefined = 0,
    /// A load attempt is in flight
    Loading = 1,
    /// The last load attempt succeeded
    Ok = 2,
    /// The last load attempt failed
    Error = 3,
}

impl LoaderStatus {
    /// Stable name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderStatus::Undefined => "UNDEFINED",
            LoaderStatus::Loading => "LOADING",
            LoaderStatus::Ok => "OK",
            LoaderStatus::Error => "ERROR",
        }
    }

    /// `OK` or `ERROR`
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoaderStatus::Ok | LoaderStatus::Error)
    }

    fn from_u8(value: u8) -> Self {
        // only discriminants of this enum are ever stored
        match value {
            0 => LoaderStatus::Undefined,
            1 => LoaderStatus::Loading,
            2 => LoaderStatus::Ok,
            _ => LoaderStatus::Error,
        }
    }
}

impl fmt::Display for LoaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free holder of a [`LoaderStatus`]
///
/// Reads never block. Writes only go through [`AtomicLoaderStatus::begin_loading`]
/// and [`AtomicLoaderStatus::finish`], neither of which can produce `UNDEFINED`.
#[derive(Debug)]
pub struct AtomicLoaderStatus(AtomicU8);

impl AtomicLoaderStatus {
    /// Start in `UNDEFINED`
    pub fn new() -> Self {
        Self(AtomicU8::new(LoaderStatus::Undefined as u8))
    }

    /// Current status
    pub fn load(&self) -> LoaderStatus {
        LoaderStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Enter `LOADING`, returning the previous status
    pub fn begin_loading(&self) -> LoaderStatus {
        LoaderStatus::from_u8(self.0.swap(LoaderStatus::Loading as u8, Ordering::AcqRel))
    }

    /// Move `LOADING` to a terminal status
    ///
    /// Returns `false` (and changes nothing) if the holder is not `LOADING`
    /// or `status` is not terminal.
    pub fn finish(&self, status: LoaderStatus) -> bool {
        status.is_terminal()
            && self
                .0
                .compare_exchange(
                    LoaderStatus::Loading as u8,
                    status as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }
}

impl Default for AtomicLoaderStatus {
    fn default() -> Self {
        Self::new()
    }
}
