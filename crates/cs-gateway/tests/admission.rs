//! Connection gate and probe routes, exercised through the router

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use common::FakeSpawner;
use cs_core::config::GatewayConfig;
use cs_gateway::{router, GatewayState};

fn state(config: GatewayConfig) -> (Arc<GatewayState>, Arc<FakeSpawner>) {
    let spawner = FakeSpawner::failing();
    let state = Arc::new(GatewayState::new(config, spawner.clone()));
    (state, spawner)
}

fn get(uri: &str, host: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_disallowed_host_is_forbidden() {
    let (state, spawner) = state(GatewayConfig::default());

    let response = router(Arc::clone(&state))
        .oneshot(get("/xterm.js", "evil.example.com"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(spawner.spawns(), 0);
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn test_disallowed_host_with_port_is_forbidden() {
    let (state, spawner) = state(GatewayConfig::default());

    let response = router(state)
        .oneshot(get("/xterm.js", "evil.example.com:8261"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(spawner.spawns(), 0);
}

#[tokio::test]
async fn test_mismatched_origin_is_forbidden() {
    let (state, spawner) = state(GatewayConfig::default());

    let request = Request::builder()
        .uri("/xterm.js")
        .header(header::HOST, "localhost:8261")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(spawner.spawns(), 0);
}

#[tokio::test]
async fn test_allowed_host_without_upgrade() {
    let (state, spawner) = state(GatewayConfig::default());

    let response = router(Arc::clone(&state))
        .oneshot(get("/xterm.js", "localhost:8261"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    assert_eq!(spawner.spawns(), 0);
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn test_host_match_ignores_case() {
    let mut config = GatewayConfig::default();
    config.session.allowed_hostnames = vec!["Shell.Example.COM".to_string()];
    let (state, _spawner) = state(config);

    let response = router(state)
        .oneshot(get("/xterm.js", "shell.example.com"))
        .await
        .unwrap();

    // Past the gate; only the missing upgrade stops it
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

#[tokio::test]
async fn test_liveness() {
    let (state, _spawner) = state(GatewayConfig::default());

    let response = router(state)
        .oneshot(get("/liveness", "anything"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_fails_after_shutdown() {
    let (state, _spawner) = state(GatewayConfig::default());
    let app = router(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(get("/readiness", "localhost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    state.registry().shutdown();

    let response = app.oneshot(get("/readiness", "localhost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_route_prefix_and_custom_paths() {
    let mut config = GatewayConfig::default();
    config.url_route_prefix = "/shell".to_string();
    config.path_xtermjs = "/ws".to_string();
    config.path_liveness = "/healthz".to_string();
    let (state, _spawner) = state(config);
    let app = router(state);

    let response = app
        .clone()
        .oneshot(get("/shell/healthz", "localhost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/shell/ws", "evil.example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.oneshot(get("/xterm.js", "localhost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
