//! Dispatcher behavior against mock backends.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use least_conn_lb::config::TimeoutConfig;
use least_conn_lb::http::{DispatchError, Dispatcher};
use least_conn_lb::load_balancer::{Backend, BackendGuard};
use least_conn_lb::BackendRegistry;

mod common;

fn dispatcher(addresses: &[String], timeouts: TimeoutConfig) -> Dispatcher {
    let registry = Arc::new(BackendRegistry::new(addresses).unwrap());
    Dispatcher::new(registry, &timeouts)
}

fn all_idle(d: &Dispatcher) -> bool {
    d.registry().backends().iter().all(|b| b.in_flight() == 0)
}

/// Hold a slot on the sole backend so an extra release would show up as 0.
fn hold_sole_backend(d: &Dispatcher) -> (Arc<Backend>, BackendGuard) {
    let backend = d.registry().backends()[0].clone();
    let guard = d.registry().reserve(&backend);
    (backend, guard)
}

#[tokio::test]
async fn test_concurrent_requests_reach_every_backend() {
    let mut backends = Vec::new();
    for _ in 0..3 {
        backends.push(common::start_programmable_backend(200, Duration::from_millis(200)).await);
    }
    let urls: Vec<String> = backends.iter().map(|b| b.url()).collect();
    let d = dispatcher(&urls, TimeoutConfig::default());

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let d = d.clone();
        tasks.push(tokio::spawn(async move {
            let dispatched = d.dispatch("/").await.expect("dispatch failed");
            assert_eq!(dispatched.status(), StatusCode::OK);
            dispatched.body_text()
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        seen.insert(task.await.unwrap());
    }

    let expected: HashSet<String> = urls.iter().map(|u| format!("Response from {}", u)).collect();
    assert_eq!(seen, expected, "not all backends were utilized");
    assert!(all_idle(&d));
}

#[tokio::test]
async fn test_unreachable_backend_releases_reservation() {
    let addr = common::refused_addr().await;
    let d = dispatcher(&[format!("http://{}", addr)], TimeoutConfig::default());
    let (backend, held) = hold_sole_backend(&d);

    let err = d.dispatch("/").await.unwrap_err();
    match &err {
        DispatchError::BackendUnreachable { address, .. } => {
            assert_eq!(address, &format!("http://{}", addr));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    // exactly one decrement: the held slot is still counted
    assert_eq!(backend.in_flight(), 1);

    assert!(d.dispatch("/").await.is_err());
    assert_eq!(backend.in_flight(), 1);

    drop(held);
    assert!(all_idle(&d));
}

#[tokio::test]
async fn test_backend_status_is_mirrored() {
    let backend = common::start_programmable_backend(404, Duration::ZERO).await;
    let d = dispatcher(&[backend.url()], TimeoutConfig::default());
    let (held_backend, held) = hold_sole_backend(&d);

    let dispatched = d.dispatch("/missing").await.unwrap();
    assert_eq!(dispatched.status(), StatusCode::NOT_FOUND);
    assert_eq!(dispatched.body_text(), format!("Response from {}", backend.url()));

    // reservation lives as long as the dispatched response
    assert_eq!(held_backend.in_flight(), 2);
    drop(dispatched);
    assert_eq!(held_backend.in_flight(), 1);

    drop(held);
    assert!(all_idle(&d));
}

#[tokio::test]
async fn test_path_is_forwarded_with_get() {
    let backend = common::start_mock_backend().await;
    let d = dispatcher(&[backend.url()], TimeoutConfig::default());

    d.dispatch("/api/v1/items").await.unwrap();
    assert_eq!(backend.request_lines(), vec!["GET /api/v1/items HTTP/1.1".to_string()]);
}

#[tokio::test]
async fn test_upstream_deadline_is_unreachable() {
    let backend = common::start_programmable_backend(200, Duration::from_secs(5)).await;
    let timeouts = TimeoutConfig {
        upstream_secs: 1,
        ..Default::default()
    };
    let d = dispatcher(&[backend.url()], timeouts);
    let (held_backend, held) = hold_sole_backend(&d);

    let err = d.dispatch("/").await.unwrap_err();
    assert!(matches!(err, DispatchError::BackendUnreachable { .. }));
    assert_eq!(held_backend.in_flight(), 1);

    drop(held);
    assert!(all_idle(&d));
}

#[tokio::test]
async fn test_cancelled_dispatch_releases_reservation() {
    let backend = common::start_programmable_backend(200, Duration::from_secs(2)).await;
    let d = dispatcher(&[backend.url()], TimeoutConfig::default());
    let (held_backend, held) = hold_sole_backend(&d);

    let task = {
        let d = d.clone();
        tokio::spawn(async move { d.dispatch("/").await.map(|r| r.status()) })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(held_backend.in_flight(), 2);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(held_backend.in_flight(), 1);

    drop(held);
    assert!(all_idle(&d));
}

#[tokio::test]
async fn test_busy_backend_is_skipped() {
    let slow = common::start_programmable_backend(200, Duration::from_millis(500)).await;
    let fast = common::start_mock_backend().await;
    let d = dispatcher(&[slow.url(), fast.url()], TimeoutConfig::default());

    let pending = {
        let d = d.clone();
        tokio::spawn(async move { d.dispatch("/").await.map(|r| r.body_text()) })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // slow has one in flight, so the next request goes to fast
    let dispatched = d.dispatch("/").await.unwrap();
    assert_eq!(dispatched.body_text(), format!("Response from {}", fast.url()));
    drop(dispatched);

    assert_eq!(
        pending.await.unwrap().unwrap(),
        format!("Response from {}", slow.url())
    );
    assert!(all_idle(&d));
}
