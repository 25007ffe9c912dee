//! Common test utilities for integration tests
//!
//! A wiremock-backed identity provider serving JWKS and well-known documents,
//! plus JWK fixtures and counter helpers.

#![allow(dead_code)]

use keyguard::config::{HttpConfig, LoaderConfig, ParserLimits};
use keyguard::jwks::KeyLoader;
use keyguard::security::{NoopEventSink, SecurityEvent, SecurityEventCounter, SecurityEventSink};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

/// RSA modulus (base64url, 2048 bit)
pub const RSA_N: &str = "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw";

/// P-256 public point
pub const EC_X: &str = "MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4";
pub const EC_Y: &str = "4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM";

pub const JWKS_PATH: &str = "/protocol/openid-connect/certs";
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

pub fn rsa_jwk(kid: &str) -> Value {
    json!({"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": RSA_N, "e": "AQAB"})
}

pub fn ec_jwk(kid: &str) -> Value {
    json!({"kty": "EC", "kid": kid, "crv": "P-256", "x": EC_X, "y": EC_Y})
}

pub fn oct_jwk(kid: &str) -> Value {
    json!({"kty": "oct", "kid": kid, "k": "GawgguFyGrWKav7AX4VKUg"})
}

pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Mock identity provider
pub struct MockIdentityProvider {
    pub server: MockServer,
    pub jwks_endpoint: String,
    pub well_known_endpoint: String,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();

        Self {
            jwks_endpoint: format!("{}{}", base_url, JWKS_PATH),
            well_known_endpoint: format!("{}{}", base_url, WELL_KNOWN_PATH),
            server,
        }
    }

    /// Serve a JWKS document
    pub async fn mock_jwks(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS document and require exactly `calls` requests
    pub async fn mock_jwks_expecting(&self, document: Value, calls: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS document after a delay
    pub async fn mock_slow_jwks(&self, document: Value, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(document)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS document with an ETag, answering 304 to matching revalidation
    pub async fn mock_jwks_with_etag(&self, document: Value, etag: &str) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .and(header("If-None-Match", etag))
            .respond_with(ResponseTemplate::new(304).insert_header("ETag", etag))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(document)
                    .insert_header("ETag", etag),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every JWKS request with `status`
    pub async fn mock_jwks_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve a raw JWKS body
    pub async fn mock_jwks_raw(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a discovery document pointing at this server's JWKS endpoint
    pub async fn mock_well_known(&self) {
        let document = json!({
            "issuer": self.server.uri(),
            "authorization_endpoint": format!("{}/auth", self.server.uri()),
            "token_endpoint": format!("{}/token", self.server.uri()),
            "jwks_uri": self.jwks_endpoint,
            "id_token_signing_alg_values_supported": ["RS256", "ES256"]
        });
        self.mock_well_known_document(document).await;
    }

    /// Serve an arbitrary discovery document
    pub async fn mock_well_known_document(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Answer every discovery request with `status`
    pub async fn mock_well_known_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(WELL_KNOWN_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received for `request_path`
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }

    /// Loader reading the JWKS endpoint directly
    pub fn direct_loader(&self) -> KeyLoader {
        self.direct_loader_with(ParserLimits::default(), HttpConfig::default())
    }

    pub fn direct_loader_with(&self, limits: ParserLimits, http: HttpConfig) -> KeyLoader {
        let config = LoaderConfig::builder()
            .jwks_url(&self.jwks_endpoint)
            .issuer_identifier(self.server.uri())
            .parser_limits(limits)
            .http(http)
            .build()
            .expect("valid loader config");
        KeyLoader::new(config)
    }

    /// Loader resolving the JWKS endpoint through discovery
    pub fn well_known_loader(&self) -> KeyLoader {
        let config = LoaderConfig::builder()
            .well_known_url(&self.well_known_endpoint)
            .issuer_identifier(self.server.uri())
            .build()
            .expect("valid loader config");
        KeyLoader::new(config)
    }
}

/// Counter that discards events
pub fn quiet_counter() -> Arc<SecurityEventCounter> {
    Arc::new(SecurityEventCounter::with_sink(Arc::new(NoopEventSink)))
}

/// Sink that keeps every event
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl CapturingSink {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }
}

impl SecurityEventSink for CapturingSink {
    fn emit(&self, event: &SecurityEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Counter plus the sink it reports to
pub fn capturing_counter() -> (Arc<SecurityEventCounter>, Arc<CapturingSink>) {
    let sink = Arc::new(CapturingSink::default());
    let counter = Arc::new(SecurityEventCounter::with_sink(sink.clone()));
    (counter, sink)
}

/// Install a test subscriber so loader logs show up with `--nocapture`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("keyguard=debug")
        .try_init();
}
