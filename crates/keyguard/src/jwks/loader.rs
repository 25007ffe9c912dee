//! Key loader orchestration
//!
//! [`KeyLoader`] ties the pieces together: it resolves the JWKS location
//! (directly or through well-known discovery), fetches it, decodes it under
//! [`ParserLimits`](crate::config::ParserLimits), parses the key material and
//! publishes the result atomically.
//!
//! ## Concurrency
//!
//! - Reads ([`KeyLoader::get_key_info`], [`KeyLoader::get_loader_status`]) are
//!   lock-free and never wait for a load in progress.
//! - Concurrent [`KeyLoader::initialize`] calls share one in-flight load.
//! - A failed load leaves the previously published [`KeySet`] in place.

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use url::Url;

use super::keys::{KeyInfo, KeySet, parse_key_set};
use super::status::{AtomicLoaderStatus, LoaderStatus};
use crate::config::{JwksSource, LoaderConfig};
use crate::discovery::WellKnownResolver;
use crate::error::Error;
use crate::http::{ErrorCategory, HttpTransport, ReqwestTransport, ResilientFetcher};
use crate::json::BoundedJsonDecoder;
use crate::security::{EventType, SecurityEventCounter};

/// Future returned by [`KeyLoader::initialize`]
///
/// Cloneable; every clone resolves to the same terminal status.
pub type InitFuture = Shared<BoxFuture<'static, LoaderStatus>>;

/// Loads and serves the verification keys of one issuer
///
/// Construction performs no I/O. Cloning is cheap and clones share state.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use keyguard::config::LoaderConfig;
/// use keyguard::jwks::{KeyLoader, LoaderStatus};
/// use keyguard::security::SecurityEventCounter;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LoaderConfig::builder()
///     .well_known_url("https://idp.example.com/.well-known/openid-configuration")
///     .issuer_identifier("https://idp.example.com")
///     .build()?;
///
/// let loader = KeyLoader::new(config);
/// let counter = Arc::new(SecurityEventCounter::new());
///
/// if loader.initialize(counter).await == LoaderStatus::Ok {
///     let key = loader.get_key_info("key-1");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KeyLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    config: LoaderConfig,
    issuer: Arc<str>,
    status: AtomicLoaderStatus,
    keys: ArcSwapOption<KeySet>,
    /// ETag of the published set
    validator: Mutex<Option<String>>,
    /// `jwks_uri` from discovery, reused by later loads until a client error
    jwks_uri: ArcSwapOption<Url>,
    transport: Option<Arc<dyn HttpTransport>>,
    fetcher: OnceCell<Arc<ResilientFetcher>>,
    in_flight: Mutex<Option<InitFuture>>,
}

/// Body to decode, or confirmation that the published set is current
enum Retrieved {
    Fresh {
        body: Bytes,
        validator: Option<String>,
    },
    NotModified,
}

/// Failed remote retrieval
struct FetchFailure {
    category: Option<ErrorCategory>,
    detail: String,
}

/// Ends a load attempt when the task running it goes away
///
/// Runs on completion, unwind and cancellation alike (e.g. the runtime that
/// spawned the load shuts down), so the loader never stays in `LOADING` and
/// the in-flight slot is always released.
struct LoadCompletion {
    inner: Arc<LoaderInner>,
    status: Option<LoaderStatus>,
}

impl LoadCompletion {
    fn new(inner: Arc<LoaderInner>) -> Self {
        Self {
            inner,
            status: None,
        }
    }

    fn complete(mut self, status: LoaderStatus) {
        self.status = Some(status);
    }
}

impl Drop for LoadCompletion {
    fn drop(&mut self) {
        let status = self.status.unwrap_or_else(|| {
            warn!(issuer = %self.inner.issuer, "Key load cancelled before completion");
            LoaderStatus::Error
        });

        // status and slot change together so a new initialize never
        // observes a finished load as in flight
        let mut in_flight = self.inner.in_flight.lock();
        self.inner.status.finish(status);
        let finished = in_flight.take();
        drop(in_flight);
        drop(finished);

        crate::metrics::record_jwks_load(&self.inner.issuer, status);
    }
}

impl KeyLoader {
    /// Create a loader using the reqwest transport
    ///
    /// The HTTP client is built on the first load that needs it.
    pub fn new(config: LoaderConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a loader over a custom transport
    pub fn with_transport(config: LoaderConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::build(config, Some(transport))
    }

    fn build(config: LoaderConfig, transport: Option<Arc<dyn HttpTransport>>) -> Self {
        let issuer: Arc<str> = Arc::from(config.issuer_identifier());
        Self {
            inner: Arc::new(LoaderInner {
                config,
                issuer,
                status: AtomicLoaderStatus::new(),
                keys: ArcSwapOption::empty(),
                validator: Mutex::new(None),
                jwks_uri: ArcSwapOption::empty(),
                transport,
                fetcher: OnceCell::new(),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Start loading keys, or join the load already in flight
    ///
    /// All callers that arrive while a load is in flight receive a clone of
    /// the same future; only one fetch and parse happens. Events are recorded
    /// on the counter of the call that started the load. Load failures never
    /// surface as errors: the future resolves to [`LoaderStatus::Error`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn initialize(&self, counter: Arc<SecurityEventCounter>) -> InitFuture {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(pending) = in_flight.as_ref() {
            debug!(issuer = %self.inner.issuer, "Joining in-flight key load");
            return pending.clone();
        }

        let previous = self.inner.status.begin_loading();
        debug!(
            issuer = %self.inner.issuer,
            source = self.inner.config.source().kind(),
            previous = %previous,
            "Starting key load"
        );

        let (done_tx, done_rx) = oneshot::channel();
        let future = async move { done_rx.await.unwrap_or(LoaderStatus::Error) }
            .boxed()
            .shared();
        *in_flight = Some(future.clone());
        drop(in_flight);

        // spawned outside the slot lock: a task dropped on spawn releases the
        // slot from its own completion guard
        let inner = Arc::clone(&self.inner);
        let completion = LoadCompletion::new(Arc::clone(&self.inner));
        tokio::spawn(async move {
            let status = match AssertUnwindSafe(inner.load(&counter)).catch_unwind().await {
                Ok(status) => status,
                Err(_) => {
                    error!(issuer = %inner.issuer, "Key load panicked");
                    counter.record(EventType::JwksLoadFailed, Some(&*inner.issuer));
                    LoaderStatus::Error
                }
            };
            // finish before waking waiters
            completion.complete(status);
            let _ = done_tx.send(status);
        });

        future
    }

    /// Key with the given `kid` from the last published set
    ///
    /// Independent of [`KeyLoader::get_loader_status`]: the last good set
    /// stays queryable while loading and after a failed reload. Unknown or
    /// empty ids return `None` without recording any event.
    pub fn get_key_info(&self, kid: &str) -> Option<Arc<KeyInfo>> {
        self.inner.keys.load_full()?.get(kid)
    }

    /// Current status
    pub fn get_loader_status(&self) -> LoaderStatus {
        self.inner.status.load()
    }

    /// Snapshot of the published set
    pub fn key_set(&self) -> Option<Arc<KeySet>> {
        self.inner.keys.load_full()
    }

    /// Issuer tag attached to this loader's events
    pub fn issuer_identifier(&self) -> &str {
        &self.inner.issuer
    }

    /// Configured key source
    pub fn jwks_source(&self) -> &JwksSource {
        self.inner.config.source()
    }

    /// JWKS endpoint found through discovery, once resolved
    pub fn resolved_jwks_uri(&self) -> Option<Url> {
        self.inner.jwks_uri.load_full().map(|uri| Url::clone(&uri))
    }
}

impl fmt::Debug for KeyLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLoader")
            .field("issuer", &self.inner.issuer)
            .field("source", &self.inner.config.source().kind())
            .field("status", &self.get_loader_status())
            .field("keys", &self.key_set().map(|keys| keys.len()))
            .finish()
    }
}

impl LoaderInner {
    async fn load(&self, counter: &Arc<SecurityEventCounter>) -> LoaderStatus {
        let decoder = BoundedJsonDecoder::new(*self.config.parser_limits(), Arc::clone(counter))
            .with_issuer(Arc::clone(&self.issuer));

        let retrieved = match self.config.source() {
            JwksSource::Http(url) => self.fetch_remote(url).await.map_err(|failure| failure.detail),
            JwksSource::WellKnown(well_known_url) => {
                let Some(jwks_uri) = self.resolve_jwks_uri(well_known_url, &decoder, counter).await
                else {
                    return LoaderStatus::Error;
                };
                self.fetch_remote(&jwks_uri).await.map_err(|failure| {
                    // the endpoint may have moved; rediscover on the next load
                    if failure.category == Some(ErrorCategory::ClientError) {
                        debug!(issuer = %self.issuer, jwks_uri = %jwks_uri, "Discarding resolved jwks_uri");
                        self.jwks_uri.store(None);
                    }
                    failure.detail
                })
            }
            JwksSource::File(path) => tokio::fs::read(path)
                .await
                .map(|body| Retrieved::Fresh {
                    body: Bytes::from(body),
                    validator: None,
                })
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e)),
            JwksSource::Inline(content) => Ok(Retrieved::Fresh {
                body: Bytes::copy_from_slice(content.as_bytes()),
                validator: None,
            }),
        };

        let (body, validator) = match retrieved {
            Ok(Retrieved::Fresh { body, validator }) => (body, validator),
            Ok(Retrieved::NotModified) => {
                debug!(issuer = %self.issuer, "Key set not modified");
                return LoaderStatus::Ok;
            }
            Err(detail) => return self.fail(counter, &detail),
        };

        let document = match decoder.decode(&body) {
            Ok(document) => document,
            Err(e) => return self.fail(counter, &e.to_string()),
        };
        let Some(keys) = parse_key_set(&document) else {
            return self.fail(counter, "Document is not a JWK set");
        };

        self.publish(keys, validator);
        LoaderStatus::Ok
    }

    async fn resolve_jwks_uri(
        &self,
        well_known_url: &Url,
        decoder: &BoundedJsonDecoder,
        counter: &Arc<SecurityEventCounter>,
    ) -> Option<Url> {
        if let Some(jwks_uri) = self.jwks_uri.load_full() {
            return Some(Url::clone(&jwks_uri));
        }

        let fetcher = match self.fetcher() {
            Ok(fetcher) => fetcher,
            Err(e) => {
                warn!(issuer = %self.issuer, error = %e, "Failed to resolve jwks_uri");
                counter.record(EventType::JwksUriResolutionFailed, Some(&*self.issuer));
                return None;
            }
        };

        let resolver = WellKnownResolver::new(
            Arc::clone(fetcher),
            decoder.clone(),
            Arc::clone(counter),
            Arc::clone(&self.issuer),
        );
        let jwks_uri = resolver.resolve_jwks_uri(well_known_url).await.ok()?;
        self.jwks_uri.store(Some(Arc::new(jwks_uri.clone())));
        Some(jwks_uri)
    }

    async fn fetch_remote(&self, url: &Url) -> Result<Retrieved, FetchFailure> {
        let fetcher = self.fetcher().map_err(|e| FetchFailure {
            category: None,
            detail: e.to_string(),
        })?;
        let validator = self.validator.lock().clone();
        let result = fetcher.fetch(url, validator.as_deref()).await;

        if !result.valid {
            let category = result.error_category;
            return Err(FetchFailure {
                category,
                detail: format!(
                    "Fetch of {} failed ({}): {}",
                    url,
                    category.map_or("UNKNOWN", |category| category.as_str()),
                    result.detail.as_deref().unwrap_or("")
                ),
            });
        }
        if result.not_modified && self.keys.load().is_some() {
            return Ok(Retrieved::NotModified);
        }
        match result.content {
            Some(body) => Ok(Retrieved::Fresh {
                body,
                validator: result.cache_validator,
            }),
            None => Err(FetchFailure {
                category: None,
                detail: format!("Fetch of {} returned no content", url),
            }),
        }
    }

    fn fetcher(&self) -> Result<&Arc<ResilientFetcher>, Error> {
        self.fetcher.get_or_try_init(|| {
            let transport: Arc<dyn HttpTransport> = match &self.transport {
                Some(transport) => Arc::clone(transport),
                None => Arc::new(ReqwestTransport::new(self.config.http())?),
            };
            Ok(Arc::new(ResilientFetcher::new(
                transport,
                self.config.http().clone(),
            )))
        })
    }

    fn publish(&self, keys: KeySet, validator: Option<String>) {
        let key_count = keys.len();
        let key_ids = keys.key_ids().join(",");
        self.keys.store(Some(Arc::new(keys)));
        *self.validator.lock() = validator;
        info!(
            issuer = %self.issuer,
            source = self.config.source().kind(),
            key_count,
            key_ids = %key_ids,
            "JWKS keys updated"
        );
    }

    fn fail(&self, counter: &SecurityEventCounter, detail: &str) -> LoaderStatus {
        error!(issuer = %self.issuer, detail, "Failed to load JWKS");
        counter.record(EventType::JwksLoadFailed, Some(&*self.issuer));

        if self.keys.load().is_none() {
            warn!(issuer = %self.issuer, "No cached key set available");
            counter.record(EventType::JwksCacheUnavailable, Some(&*self.issuer));
        } else {
            debug!(issuer = %self.issuer, "Serving previously loaded key set");
        }
        LoaderStatus::Error
    }
}
