//! HTTP transport abstraction and the reqwest-backed implementation

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{ACCEPT, ETAG, IF_NONE_MATCH};
use std::fmt;
use thiserror::Error;
use url::Url;

use super::result::ErrorCategory;
use crate::config::HttpConfig;
use crate::error::Error;

/// Raw response handed back by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// `ETag` header, if present and valid ASCII
    pub etag: Option<String>,
    /// Complete response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Convenience constructor
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            etag: None,
            body: body.into(),
        }
    }

    /// Set the `ETag`
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Transport-level failures (no HTTP status received)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connect or request timeout elapsed
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Body exceeded the configured maximum
    #[error("Response body exceeds {max} bytes")]
    TooLarge {
        /// Configured maximum
        max: usize,
    },

    /// Body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// Any other request failure
    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Fetch failure category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::TooLarge { .. } => ErrorCategory::InvalidContent,
            TransportError::Timeout(_)
            | TransportError::Connect(_)
            | TransportError::Body(_)
            | TransportError::Request(_) => ErrorCategory::NetworkError,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Conditional HTTP GET capability
///
/// Implementations must not follow redirects and must bound the body size.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Perform a GET, sending `If-None-Match` when a validator is given
    async fn get(&self, url: &Url, if_none_match: Option<&str>)
    -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_size: usize,
}

impl ReqwestTransport {
    /// Build a client from the HTTP settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the client cannot be constructed
    pub fn new(config: &HttpConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        if_none_match: Option<&str>,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        if let Some(validator) = if_none_match {
            request = request.header(IF_NONE_MATCH, validator);
        }

        let mut response = request.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let max = self.max_response_size;
        if let Some(content_length) = response.content_length()
            && content_length > max as u64
        {
            return Err(TransportError::TooLarge { max });
        }

        // Content-Length can be absent or wrong; enforce while streaming
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(TransportError::from_reqwest)? {
            if body.len() + chunk.len() > max {
                return Err(TransportError::TooLarge { max });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            etag,
            body: body.freeze(),
        })
    }
}
