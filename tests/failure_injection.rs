//! End-to-end failure injection tests through the HTTP server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use lb_proxy::config::{BackendConfig, ProxyConfig};
use lb_proxy::http::{HttpServer, X_REQUEST_ID};
use lb_proxy::lifecycle::Shutdown;

mod common;

fn base_config(backends: &[SocketAddr]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    for addr in backends {
        config.backends.push(BackendConfig::new(addr.to_string(), 1));
    }
    config.health_check.enabled = false;
    config.timeouts.request_secs = 2;
    config
}

/// Start the proxy on an ephemeral port; returns its address.
async fn start_proxy(config: ProxyConfig, shutdown: &Shutdown) -> SocketAddr {
    let server = HttpServer::new(config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_round_robin_across_backends() {
    let b1 = common::start_mock_backend("b1").await;
    let b2 = common::start_mock_backend("b2").await;

    let shutdown = Shutdown::new();
    let proxy = start_proxy(base_config(&[b1, b2]), &shutdown).await;
    let client = client();

    let mut bodies = Vec::new();
    for _ in 0..4 {
        let res = client.get(format!("http://{}/", proxy)).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert!(res.headers().contains_key(X_REQUEST_ID.as_str()));
        bodies.push(res.text().await.unwrap());
    }

    // Strict alternation.
    assert_ne!(bodies[0], bodies[1]);
    assert_eq!(bodies[0], bodies[2]);
    assert_eq!(bodies[1], bodies[3]);

    shutdown.trigger();
}

#[tokio::test]
async fn test_path_and_query_forwarded() {
    let backend = common::start_programmable_backend(|path| async move { (200, path) }).await;

    let shutdown = Shutdown::new();
    let proxy = start_proxy(base_config(&[backend]), &shutdown).await;

    let res = client()
        .get(format!("http://{}/users/7?active=true", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/users/7?active=true");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let dead = common::unreachable_addr().await;

    let shutdown = Shutdown::new();
    let config = base_config(&[dead]);
    let server = HttpServer::new(config).unwrap();
    let core = server.core().clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client().get(format!("http://{}/", proxy)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(core.pool()[0].connections(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_all_backends_dead_is_service_unavailable() {
    let dead1 = common::unreachable_addr().await;
    let dead2 = common::unreachable_addr().await;

    let mut config = base_config(&[dead1, dead2]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;

    let shutdown = Shutdown::new();
    let proxy = start_proxy(config, &shutdown).await;

    // The initial probe round runs at startup; give it a moment to land.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let res = client().get(format!("http://{}/", proxy)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "No healthy backends available");

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_check_eviction() {
    let b1_addr = common::start_mock_backend("b1").await;

    let b2_healthy = Arc::new(AtomicBool::new(true));
    let b2h = b2_healthy.clone();
    let b2_addr = common::start_programmable_backend(move |_| {
        let healthy = b2h.load(Ordering::SeqCst);
        async move {
            if healthy {
                (200, "b2".into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let mut config = base_config(&[b1_addr, b2_addr]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;

    let shutdown = Shutdown::new();
    let proxy = start_proxy(config, &shutdown).await;
    let client = client();

    let mut b1_hits = 0;
    let mut b2_hits = 0;
    for _ in 0..10 {
        let body = client.get(format!("http://{}", proxy)).send().await.unwrap().text().await.unwrap();
        if body == "b1" { b1_hits += 1; }
        if body == "b2" { b2_hits += 1; }
    }
    assert!(b1_hits > 0, "b1 should have hits (got {})", b1_hits);
    assert!(b2_hits > 0, "b2 should have hits (got {})", b2_hits);

    b2_healthy.store(false, Ordering::SeqCst);

    // One failed probe is enough; wait for the next round.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    b1_hits = 0;
    b2_hits = 0;
    for _ in 0..10 {
        let res = client.get(format!("http://{}", proxy)).send().await.unwrap();
        let body = res.text().await.unwrap();
        if body == "b1" { b1_hits += 1; }
        if body == "b2" { b2_hits += 1; }
    }
    assert_eq!(b1_hits, 10, "Only b1 should be hit after b2 eviction");
    assert_eq!(b2_hits, 0, "b2 should have 0 hits after eviction");

    b2_healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let mut b2_back = false;
    for _ in 0..4 {
        let body = client.get(format!("http://{}", proxy)).send().await.unwrap().text().await.unwrap();
        b2_back |= body == "b2";
    }
    assert!(b2_back, "b2 should rejoin after a successful probe");

    shutdown.trigger();
}

#[tokio::test]
async fn test_stalled_body_bounded_by_request_timeout() {
    let stalling = common::start_stalling_backend().await;

    let mut config = base_config(&[stalling]);
    config.timeouts.request_secs = 1;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let core = server.core().clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client().get(format!("http://{}/", proxy)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(core.pool()[0].connections(), 1, "backend is busy while the body streams");

    let body = tokio::time::timeout(Duration::from_secs(5), res.text())
        .await
        .expect("body must be cut off at the request timeout");
    assert!(body.is_err(), "truncated body must surface as an error");

    assert!(common::eventually(Duration::from_secs(2), || core.pool()[0].connections() == 0).await);

    shutdown.trigger();
}
