//! Concurrent initialization and read-safety tests

mod common;

use common::{JWKS_PATH, MockIdentityProvider, jwks, quiet_counter, rsa_jwk};
use futures::future::join_all;
use keyguard::jwks::LoaderStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_coalesces_into_one_fetch() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_slow_jwks(jwks(&[rsa_jwk("k1")]), Duration::from_millis(300))
        .await;

    let loader = idp.direct_loader();
    let counter = quiet_counter();

    let futures: Vec<_> = (0..32)
        .map(|_| {
            let loader = loader.clone();
            let counter = counter.clone();
            tokio::spawn(async move { loader.initialize(counter).await })
        })
        .collect();

    let statuses: Vec<LoaderStatus> = join_all(futures)
        .await
        .into_iter()
        .map(|joined| joined.expect("task should not panic"))
        .collect();

    assert!(statuses.iter().all(|status| *status == LoaderStatus::Ok));
    assert_eq!(idp.requests_to(JWKS_PATH).await, 1);
    assert!(loader.get_key_info("k1").is_some());
}

#[tokio::test]
async fn test_clones_of_one_future_agree() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_slow_jwks(jwks(&[rsa_jwk("k1")]), Duration::from_millis(100))
        .await;

    let loader = idp.direct_loader();
    let first = loader.initialize(quiet_counter());
    let second = loader.initialize(quiet_counter());
    assert_eq!(loader.get_loader_status(), LoaderStatus::Loading);

    let (a, b) = futures::join!(first, second);
    assert_eq!(a, LoaderStatus::Ok);
    assert_eq!(a, b);
    assert_eq!(idp.requests_to(JWKS_PATH).await, 1);
}

#[tokio::test]
async fn test_load_runs_without_being_awaited() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(jwks(&[rsa_jwk("k1")])).await;

    let loader = idp.direct_loader();
    drop(loader.initialize(quiet_counter()));

    for _ in 0..200 {
        if loader.get_loader_status() == LoaderStatus::Ok {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(loader.get_loader_status(), LoaderStatus::Ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_reads_under_contention() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_slow_jwks(jwks(&[rsa_jwk("k1")]), Duration::from_millis(200))
        .await;

    let loader = idp.direct_loader();
    let pending = loader.initialize(quiet_counter());

    let saw_undefined = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..100)
        .map(|_| {
            let loader = loader.clone();
            let saw_undefined = Arc::clone(&saw_undefined);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    // initialize already ran, so UNDEFINED must never come back
                    if loader.get_loader_status() == LoaderStatus::Undefined {
                        saw_undefined.store(true, Ordering::SeqCst);
                    }
                    let _ = loader.get_key_info("k1");
                }
            })
        })
        .collect();

    for reader in readers {
        reader.join().expect("reader thread panicked");
    }
    assert!(!saw_undefined.load(Ordering::SeqCst));
    assert_eq!(pending.await, LoaderStatus::Ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_continue_during_reload() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(jwks(&[rsa_jwk("k1")])).await;

    let loader = idp.direct_loader();
    assert_eq!(loader.initialize(quiet_counter()).await, LoaderStatus::Ok);

    idp.server.reset().await;
    idp.mock_slow_jwks(jwks(&[rsa_jwk("k2")]), Duration::from_millis(200))
        .await;

    let reload = loader.initialize(quiet_counter());
    assert_eq!(loader.get_loader_status(), LoaderStatus::Loading);
    // old set is still served while the reload is in flight
    assert!(loader.get_key_info("k1").is_some());

    assert_eq!(reload.await, LoaderStatus::Ok);
    assert!(loader.get_key_info("k1").is_none());
    assert!(loader.get_key_info("k2").is_some());
}
