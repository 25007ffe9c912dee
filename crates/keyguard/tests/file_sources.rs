//! Local key sources, file-based settings and the reqwest transport

mod common;

use common::{JWKS_PATH, MockIdentityProvider, ec_jwk, jwks, quiet_counter, rsa_jwk};
use keyguard::config::{HttpConfig, LoaderConfig, LoaderSettings};
use keyguard::http::{HttpTransport, ReqwestTransport, TransportError};
use keyguard::jwks::{KeyLoader, KeyType, LoaderStatus};
use keyguard::security::EventType;
use std::io::Write;
use url::Url;
use wiremock::matchers::{header, path};
use wiremock::{Mock, ResponseTemplate};

fn write_jwks_file(document: &serde_json::Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("create temp file");
    write!(file, "{}", document).expect("write jwks");
    file
}

#[tokio::test]
async fn test_file_source_loads() {
    let file = write_jwks_file(&jwks(&[rsa_jwk("file-rsa"), ec_jwk("file-ec")]));
    let config = LoaderConfig::builder()
        .jwks_file(file.path())
        .issuer_identifier("file-idp")
        .build()
        .unwrap();
    let loader = KeyLoader::new(config);
    let counter = quiet_counter();

    assert_eq!(loader.initialize(counter.clone()).await, LoaderStatus::Ok);
    assert_eq!(
        loader.get_key_info("file-ec").unwrap().key_type(),
        KeyType::Ec
    );
    assert_eq!(loader.jwks_source().kind(), "file");
    assert_eq!(counter.total(), 0);
}

#[tokio::test]
async fn test_missing_file_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoaderConfig::builder()
        .jwks_file(dir.path().join("absent.json"))
        .issuer_identifier("file-idp")
        .build()
        .unwrap();
    let loader = KeyLoader::new(config);
    let counter = quiet_counter();

    assert_eq!(loader.initialize(counter.clone()).await, LoaderStatus::Error);
    assert_eq!(counter.count(EventType::JwksLoadFailed), 1);
    assert_eq!(counter.count(EventType::JwksCacheUnavailable), 1);
    assert_eq!(counter.count(EventType::JsonParseFailed), 0);
}

#[tokio::test]
async fn test_file_is_reread_on_reload() {
    let file = write_jwks_file(&jwks(&[rsa_jwk("first")]));
    let config = LoaderConfig::builder()
        .jwks_file(file.path())
        .issuer_identifier("file-idp")
        .build()
        .unwrap();
    let loader = KeyLoader::new(config);
    assert_eq!(loader.initialize(quiet_counter()).await, LoaderStatus::Ok);

    std::fs::write(file.path(), jwks(&[rsa_jwk("second")]).to_string()).unwrap();

    assert_eq!(loader.initialize(quiet_counter()).await, LoaderStatus::Ok);
    assert!(loader.get_key_info("first").is_none());
    assert!(loader.get_key_info("second").is_some());
}

#[tokio::test]
async fn test_single_key_document_is_accepted() {
    let config = LoaderConfig::builder()
        .jwks_content(rsa_jwk("solo").to_string())
        .issuer_identifier("inline-idp")
        .build()
        .unwrap();
    let loader = KeyLoader::new(config);

    assert_eq!(loader.initialize(quiet_counter()).await, LoaderStatus::Ok);
    assert_eq!(loader.key_set().unwrap().key_ids(), vec!["solo"]);
}

#[tokio::test]
async fn test_settings_file_drives_a_loader() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(jwks(&[rsa_jwk("k1")])).await;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
jwks_url = "{}"
issuer_identifier = "settings-idp"

[parser]
max_depth = 5

[http]
max_response_size = 65536
"#,
        idp.jwks_endpoint
    )
    .unwrap();

    let settings =
        LoaderSettings::from_file_with_prefix(file.path(), "KEYGUARD_FILE_SOURCES_UNUSED")
            .unwrap();
    let config = LoaderConfig::try_from(settings).unwrap();
    assert_eq!(config.parser_limits().max_depth, 5);
    assert_eq!(config.http().max_response_size, 65536);

    let loader = KeyLoader::new(config);
    assert_eq!(loader.issuer_identifier(), "settings-idp");
    assert_eq!(loader.initialize(quiet_counter()).await, LoaderStatus::Ok);
    assert!(loader.get_key_info("k1").is_some());
}

#[tokio::test]
async fn test_reqwest_transport_sends_validator_and_reads_etag() {
    let idp = MockIdentityProvider::start().await;
    Mock::given(path(JWKS_PATH))
        .and(header("If-None-Match", "\"abc\""))
        .respond_with(ResponseTemplate::new(304).insert_header("ETag", "\"abc\""))
        .mount(&idp.server)
        .await;
    Mock::given(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"keys\":[]}")
                .insert_header("ETag", "\"abc\""),
        )
        .mount(&idp.server)
        .await;

    let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
    let url = Url::parse(&idp.jwks_endpoint).unwrap();

    let fresh = transport.get(&url, None).await.unwrap();
    assert_eq!(fresh.status, 200);
    assert_eq!(fresh.etag.as_deref(), Some("\"abc\""));
    assert_eq!(&fresh.body[..], b"{\"keys\":[]}");

    let revalidated = transport.get(&url, Some("\"abc\"")).await.unwrap();
    assert_eq!(revalidated.status, 304);
    assert!(revalidated.body.is_empty());
}

#[tokio::test]
async fn test_reqwest_transport_caps_body_size() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks_raw(&"x".repeat(4096)).await;

    let http = HttpConfig {
        max_response_size: 1024,
        ..HttpConfig::default()
    };
    let transport = ReqwestTransport::new(&http).unwrap();
    let url = Url::parse(&idp.jwks_endpoint).unwrap();

    assert_eq!(
        transport.get(&url, None).await,
        Err(TransportError::TooLarge { max: 1024 })
    );
}
