//! HTTP retrieval of discovery documents and key sets
//!
//! - [`transport`] - the [`HttpTransport`] seam and [`ReqwestTransport`]
//! - [`result`] - [`FetchResult`] and [`ErrorCategory`]
//! - [`fetcher`] - [`ResilientFetcher`], classification, conditional re-fetch and stale fallback

pub mod fetcher;
pub mod result;
pub mod transport;

pub use fetcher::ResilientFetcher;
pub use result::{ErrorCategory, FetchResult};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
