//! Fetch outcome model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed fetch
///
/// Every failure maps to exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Connection failure or timeout
    NetworkError,
    /// 5xx response
    ServerError,
    /// 4xx response
    ClientError,
    /// Response content failed structural checks (empty, oversized, ...)
    InvalidContent,
    /// Malformed or disallowed URL, unexpected redirect
    ConfigurationError,
}

impl ErrorCategory {
    /// Whether a later attempt may succeed without a configuration change
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::ServerError)
    }

    /// Stable name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::InvalidContent => "INVALID_CONTENT",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single logical fetch
///
/// | `valid` | `content` | meaning                                    |
/// |---------|-----------|--------------------------------------------|
/// | true    | `Some`    | fresh content, or unchanged (`not_modified`) |
/// | false   | `Some`    | failed, last good content returned as stale |
/// | false   | `None`    | failed, nothing to fall back on             |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult<T> {
    /// Fetched (or stale) content
    pub content: Option<T>,
    /// Whether the fetch itself succeeded
    pub valid: bool,
    /// HTTP status of the last response, if one was received
    pub http_status: Option<u16>,
    /// Validator (ETag) associated with `content`
    pub cache_validator: Option<String>,
    /// Failure classification; `None` when `valid`
    pub error_category: Option<ErrorCategory>,
    /// Diagnostic message for failures
    pub detail: Option<String>,
    /// Content is the cached copy confirmed by a 304
    pub not_modified: bool,
}

impl<T> FetchResult<T> {
    /// Fresh content
    pub fn success(content: T, http_status: u16, cache_validator: Option<String>) -> Self {
        Self {
            content: Some(content),
            valid: true,
            http_status: Some(http_status),
            cache_validator,
            error_category: None,
            detail: None,
            not_modified: false,
        }
    }

    /// Cached content confirmed unchanged by the server
    pub fn not_modified(content: T, cache_validator: Option<String>) -> Self {
        Self {
            content: Some(content),
            valid: true,
            http_status: Some(304),
            cache_validator,
            error_category: None,
            detail: None,
            not_modified: true,
        }
    }

    /// Failure without content
    pub fn failure(
        category: ErrorCategory,
        http_status: Option<u16>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            content: None,
            valid: false,
            http_status,
            cache_validator: None,
            error_category: Some(category),
            detail: Some(detail.into()),
            not_modified: false,
        }
    }

    /// Attach last good content to a failure
    pub fn with_stale(mut self, content: T, cache_validator: Option<String>) -> Self {
        debug_assert!(!self.valid, "only failures carry stale content");
        self.content = Some(content);
        self.cache_validator = cache_validator;
        self
    }

    /// True for failures whose category is retryable
    pub fn is_retryable(&self) -> bool {
        self.error_category.is_some_and(|c| c.is_retryable())
    }

    /// Failed, but carrying last good content
    pub fn is_stale(&self) -> bool {
        !self.valid && self.content.is_some()
    }

    /// Transform the content, keeping all metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        FetchResult {
            content: self.content.map(f),
            valid: self.valid,
            http_status: self.http_status,
            cache_validator: self.cache_validator,
            error_category: self.error_category,
            detail: self.detail,
            not_modified: self.not_modified,
        }
    }
}
