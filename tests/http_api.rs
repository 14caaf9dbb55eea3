//! HTTP endpoints driven in-process with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use common::{state, SECRET};
use realtor_gate::infrastructure::http::handlers::SessionGrant;
use realtor_gate::infrastructure::http::{router, AppState, ErrorBody};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

fn app() -> (Router, AppState) {
    let state = state(None);
    (router(state.clone()), state)
}

fn session_request(secret: Option<&str>, user: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/realtime/session")
        .header("x-user-id", user);
    if let Some(secret) = secret {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {secret}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = json(response).await;
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_session_requires_secret() {
    let (app, state) = app();

    for secret in [None, Some("wrong")] {
        let response = app
            .clone()
            .oneshot(session_request(secret, "u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.code, "UNAUTHORIZED");
    }

    // Rejected before reaching the limiter.
    let metrics = router_metrics(&state).await;
    assert_eq!(metrics["rate_limit"]["requests_allowed"], 0);
    assert_eq!(metrics["buckets"], 0);
}

#[tokio::test]
async fn test_session_quota() {
    let (app, _) = app();

    for expected_remaining in ["2", "1", "0"] {
        let response = app
            .clone()
            .oneshot(session_request(Some(SECRET), "u1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);

        let grant: SessionGrant = json(response).await;
        assert_eq!(grant.relay_path, "/api/realtime/ws");
        assert_eq!(grant.limit, 3);
    }

    let response = app
        .clone()
        .oneshot(session_request(Some(SECRET), "u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=2).contains(&retry_after));
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let body: ErrorBody = json(response).await;
    assert_eq!(body.code, "RATE_LIMITED");
    assert_eq!(
        body.message,
        format!("too many realtime session requests, try again in {retry_after}s")
    );

    // Another caller has its own quota.
    let response = app
        .oneshot(session_request(Some(SECRET), "u2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_relay_without_upgrade() {
    let (app, _) = app();
    let request = Request::get("/api/realtime/ws")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    let body: ErrorBody = json(response).await;
    assert_eq!(body.code, "UPGRADE_REQUIRED");
}

#[tokio::test]
async fn test_relay_checks_secret_first() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/realtime/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_metrics_report() {
    let (app, state) = app();
    app.clone()
        .oneshot(session_request(Some(SECRET), "u1"))
        .await
        .unwrap();

    let metrics = router_metrics(&state).await;
    assert_eq!(metrics["rate_limit"]["requests_allowed"], 1);
    assert_eq!(metrics["rate_limit"]["requests_rejected"], 0);
    assert_eq!(metrics["buckets"], 1);
    assert_eq!(metrics["relay"]["sessions_opened"], 0);
}

async fn router_metrics(state: &AppState) -> serde_json::Value {
    let response = router(state.clone())
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json(response).await
}
