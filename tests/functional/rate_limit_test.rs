//! Functional tests for rate limiting

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{send, test_app, test_settings, FakeLoader};
use dotcanvas_ai_service::{middleware::rate_limit::RateLimitLayer, AppState};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(rps: u32, burst: u32) -> Router {
    Router::new()
        .route("/test", axum::routing::get(|| async { "OK" }))
        .route("/health", axum::routing::get(|| async { "healthy" }))
        .layer(RateLimitLayer::new(rps, burst))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_rate_limit_allows_within_limit() {
    let app = create_test_app(100, 100);

    let response = app.oneshot(get("/test")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    let app = create_test_app(1, 1);

    let first = app.clone().oneshot(get("/test")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(get("/test")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_health_bypass() {
    let app = create_test_app(1, 1);

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_enabled_in_settings() {
    let mut settings = test_settings();
    settings.rate_limit.enabled = true;
    settings.rate_limit.requests_per_second = 1;
    settings.rate_limit.burst_size = 1;
    let state = Arc::new(AppState::new(settings, Arc::new(FakeLoader::new())));
    let app = test_app(state);

    let (status, _) = send(app.clone(), get("/")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get("/")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["detail"].as_str().unwrap().contains("Rate limit exceeded"));
}
