//! Resilient fetcher
//!
//! Turns a raw [`HttpTransport`] into classified [`FetchResult`]s with
//! conditional re-fetching, bounded retries and stale-content fallback.

use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::result::{ErrorCategory, FetchResult};
use super::transport::{HttpResponse, HttpTransport};
use crate::config::HttpConfig;

/// Last good body for one URL
#[derive(Debug, Clone)]
struct CachedBody {
    body: Bytes,
    validator: Option<String>,
}

/// HTTP fetcher that never fails with an error
///
/// Every outcome is a [`FetchResult`]; failures carry exactly one
/// [`ErrorCategory`]. The last good body per URL is kept so that:
///
/// - a `304 Not Modified` returns the cached body with `valid = true`
/// - a failed fetch returns the cached body as stale (`valid = false`)
///
/// Redirects are not followed; a 3xx is a configuration error.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    config: HttpConfig,
    cache: DashMap<Url, CachedBody>,
}

impl ResilientFetcher {
    /// Create a fetcher over a transport
    pub fn new(transport: Arc<dyn HttpTransport>, config: HttpConfig) -> Self {
        Self {
            transport,
            config,
            cache: DashMap::new(),
        }
    }

    /// Fetch `url`
    ///
    /// `previous_validator` is sent as `If-None-Match` when a body for this
    /// URL is cached. Retryable failures are retried up to
    /// `config.retry.max_attempts` attempts in total.
    pub async fn fetch(&self, url: &Url, previous_validator: Option<&str>) -> FetchResult<Bytes> {
        if let Err(e) = self.config.check_url(url) {
            warn!(url = %url, error = %e, "Refusing to fetch URL");
            return FetchResult::failure(ErrorCategory::ConfigurationError, None, e.to_string());
        }

        let validator = previous_validator.filter(|_| self.cache.contains_key(url));
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;

        let result = loop {
            let result = self.fetch_once(url, validator).await;
            if result.valid || !result.is_retryable() || attempt >= max_attempts {
                break result;
            }

            let delay = self.config.retry.backoff_for(attempt);
            debug!(
                url = %url,
                attempt,
                category = ?result.error_category,
                delay_ms = delay.as_millis() as u64,
                "Retrying fetch"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        };

        if result.valid {
            return result;
        }

        warn!(
            url = %url,
            attempts = attempt,
            category = ?result.error_category,
            status = ?result.http_status,
            detail = result.detail.as_deref().unwrap_or(""),
            "Fetch failed"
        );

        match self.cache.get(url) {
            Some(cached) => {
                debug!(url = %url, "Returning stale content");
                result.with_stale(cached.body.clone(), cached.validator.clone())
            }
            None => result,
        }
    }

    /// Last good body for `url`, if any
    pub fn cached(&self, url: &Url) -> Option<Bytes> {
        self.cache.get(url).map(|entry| entry.body.clone())
    }

    /// Forget the cached body for `url`
    pub fn invalidate(&self, url: &Url) {
        self.cache.remove(url);
    }

    async fn fetch_once(&self, url: &Url, validator: Option<&str>) -> FetchResult<Bytes> {
        match self.transport.get(url, validator).await {
            Ok(response) => self.classify(url, response),
            Err(e) => FetchResult::failure(e.category(), None, e.to_string()),
        }
    }

    fn classify(&self, url: &Url, response: HttpResponse) -> FetchResult<Bytes> {
        let status = response.status;
        match status {
            200..=299 if response.body.is_empty() => {
                FetchResult::failure(ErrorCategory::InvalidContent, Some(status), "Empty response body")
            }
            200..=299 => {
                self.cache.insert(
                    url.clone(),
                    CachedBody {
                        body: response.body.clone(),
                        validator: response.etag.clone(),
                    },
                );
                FetchResult::success(response.body, status, response.etag)
            }
            304 => match self.cache.get(url) {
                Some(cached) => FetchResult::not_modified(
                    cached.body.clone(),
                    response.etag.or_else(|| cached.validator.clone()),
                ),
                None => FetchResult::failure(
                    ErrorCategory::InvalidContent,
                    Some(status),
                    "304 Not Modified without cached content",
                ),
            },
            300..=399 => FetchResult::failure(
                ErrorCategory::ConfigurationError,
                Some(status),
                format!("HTTP {} redirect not followed", status),
            ),
            400..=499 => {
                FetchResult::failure(ErrorCategory::ClientError, Some(status), format!("HTTP {}", status))
            }
            500..=599 => {
                FetchResult::failure(ErrorCategory::ServerError, Some(status), format!("HTTP {}", status))
            }
            _ => FetchResult::failure(
                ErrorCategory::InvalidContent,
                Some(status),
                format!("Unexpected HTTP status {}", status),
            ),
        }
    }
}

impl fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("cached_urls", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::http::TransportError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays canned responses and records the validators it was sent
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        validators: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                validators: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.validators.lock().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            _url: &Url,
            if_none_match: Option<&str>,
        ) -> Result<HttpResponse, TransportError> {
            self.validators.lock().push(if_none_match.map(str::to_owned));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())))
        }
    }

    fn url() -> Url {
        Url::parse("https://idp.example.com/jwks").unwrap()
    }

    fn retrying(max_attempts: u32) -> HttpConfig {
        HttpConfig {
            retry: RetryConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                multiplier: 2.0,
            },
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_success_caches_body_and_etag() {
        let transport = ScriptedTransport::new(vec![Ok(
            HttpResponse::new(200, &b"{\"keys\":[]}"[..]).with_etag("\"v1\"")
        )]);
        let fetcher = ResilientFetcher::new(transport.clone(), HttpConfig::default());

        let result = fetcher.fetch(&url(), None).await;
        assert!(result.valid);
        assert_eq!(result.http_status, Some(200));
        assert_eq!(result.cache_validator.as_deref(), Some("\"v1\""));
        assert_eq!(fetcher.cached(&url()).as_deref(), Some(&b"{\"keys\":[]}"[..]));
    }

    #[tokio::test]
    async fn test_not_modified_returns_cached_body() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(200, &b"body"[..]).with_etag("\"v1\"")),
            Ok(HttpResponse::new(304, Bytes::new())),
        ]);
        let fetcher = ResilientFetcher::new(transport.clone(), HttpConfig::default());

        fetcher.fetch(&url(), None).await;
        let result = fetcher.fetch(&url(), Some("\"v1\"")).await;

        assert!(result.valid);
        assert!(result.not_modified);
        assert_eq!(result.content.as_deref(), Some(&b"body"[..]));
        assert_eq!(result.cache_validator.as_deref(), Some("\"v1\""));
        assert_eq!(
            *transport.validators.lock(),
            vec![None, Some("\"v1\"".to_string())]
        );
    }

    #[tokio::test]
    async fn test_validator_not_sent_without_cached_body() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(200, &b"x"[..]))]);
        let fetcher = ResilientFetcher::new(transport.clone(), HttpConfig::default());
        fetcher.fetch(&url(), Some("\"stale\"")).await;
        assert_eq!(*transport.validators.lock(), vec![None]);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases = [
            (301, ErrorCategory::ConfigurationError),
            (304, ErrorCategory::InvalidContent),
            (404, ErrorCategory::ClientError),
            (503, ErrorCategory::ServerError),
        ];
        for (status, expected) in cases {
            let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(status, Bytes::new()))]);
            let fetcher = ResilientFetcher::new(transport, HttpConfig::default());
            let result = fetcher.fetch(&url(), None).await;
            assert!(!result.valid);
            assert_eq!(result.content, None);
            assert_eq!(result.http_status, Some(status));
            assert_eq!(result.error_category, Some(expected), "status {status}");
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_invalid_content() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(200, Bytes::new()))]);
        let fetcher = ResilientFetcher::new(transport, HttpConfig::default());
        let result = fetcher.fetch(&url(), None).await;
        assert_eq!(result.error_category, Some(ErrorCategory::InvalidContent));
        assert!(!result.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_errors_are_classified() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout("deadline".into())),
            Err(TransportError::TooLarge { max: 10 }),
        ]);
        let fetcher = ResilientFetcher::new(transport, HttpConfig::default());

        let timeout = fetcher.fetch(&url(), None).await;
        assert_eq!(timeout.error_category, Some(ErrorCategory::NetworkError));
        assert_eq!(timeout.http_status, None);

        let too_large = fetcher.fetch(&url(), None).await;
        assert_eq!(too_large.error_category, Some(ErrorCategory::InvalidContent));
    }

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(503, Bytes::new())),
            Ok(HttpResponse::new(200, &b"x"[..])),
        ]);
        let fetcher = ResilientFetcher::new(transport.clone(), HttpConfig::default());
        let result = fetcher.fetch(&url(), None).await;
        assert_eq!(result.error_category, Some(ErrorCategory::ServerError));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried_within_bound() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(502, Bytes::new())),
            Err(TransportError::Connect("refused".into())),
            Ok(HttpResponse::new(200, &b"ok"[..])),
        ]);
        let fetcher = ResilientFetcher::new(transport.clone(), retrying(3));
        let result = fetcher.fetch(&url(), None).await;
        assert!(result.valid);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(401, Bytes::new()))]);
        let fetcher = ResilientFetcher::new(transport.clone(), retrying(5));
        let result = fetcher.fetch(&url(), None).await;
        assert_eq!(result.error_category, Some(ErrorCategory::ClientError));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_success_returns_stale_content() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(200, &b"good"[..]).with_etag("\"v1\"")),
            Ok(HttpResponse::new(500, Bytes::new())),
        ]);
        let fetcher = ResilientFetcher::new(transport, HttpConfig::default());
        fetcher.fetch(&url(), None).await;

        let result = fetcher.fetch(&url(), Some("\"v1\"")).await;
        assert!(result.is_stale());
        assert_eq!(result.content.as_deref(), Some(&b"good"[..]));
        assert_eq!(result.error_category, Some(ErrorCategory::ServerError));

        fetcher.invalidate(&url());
        assert!(fetcher.cached(&url()).is_none());
    }

    #[tokio::test]
    async fn test_insecure_url_never_reaches_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let fetcher = ResilientFetcher::new(transport.clone(), HttpConfig::default());
        let insecure = Url::parse("http://idp.example.com/jwks").unwrap();

        let result = fetcher.fetch(&insecure, None).await;
        assert_eq!(result.error_category, Some(ErrorCategory::ConfigurationError));
        assert_eq!(transport.calls(), 0);
    }
}
