//! Route handlers.

use crate::application::metrics::{MetricsSnapshot, RelayMetricsSnapshot};
use crate::application::relay::RelaySession;
use crate::domain::error::RelayError;
use crate::domain::key::RateLimitKey;
use crate::infrastructure::http::auth::Authenticated;
use crate::infrastructure::http::error::{insert_quota_headers, ApiError};
use crate::infrastructure::http::state::{AppState, SESSION_FEATURE};
use crate::infrastructure::http::RELAY_PATH;
use crate::infrastructure::socket::from_axum;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    /// Always `"ok"` while the process serves requests
    pub status: String,
}

/// `GET /health`: liveness only, no dependencies are checked.
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_owned(),
    })
}

/// Body of `GET /metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsReport {
    /// Limiter counters
    pub rate_limit: MetricsSnapshot,
    /// Buckets currently tracked
    pub buckets: usize,
    /// Relay counters
    pub relay: RelayMetricsSnapshot,
}

/// `GET /metrics`: limiter and relay counters as JSON.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsReport> {
    Json(MetricsReport {
        rate_limit: state.limiter.metrics().snapshot(),
        buckets: state.limiter.bucket_count(),
        relay: state.relay_metrics.snapshot(),
    })
}

/// Body of a granted `POST /api/realtime/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    /// Path of the WebSocket relay to connect to
    pub relay_path: String,
    /// Sessions allowed per window
    pub limit: u32,
    /// Sessions left in the current window
    pub remaining: u32,
}

/// Issue a realtime session, counted against the caller's quota.
pub async fn create_session(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Response, ApiError> {
    let key = RateLimitKey::new(SESSION_FEATURE, principal.as_str());
    let admission = state.limiter.enforce(&key, &state.session_options)?;

    tracing::info!(
        principal = %principal,
        remaining = admission.remaining,
        "Realtime session granted"
    );

    let mut response = Json(SessionGrant {
        relay_path: RELAY_PATH.to_owned(),
        limit: admission.limit,
        remaining: admission.remaining,
    })
    .into_response();
    insert_quota_headers(response.headers_mut(), admission.limit, admission.remaining);
    Ok(response)
}

/// Bridge the caller's WebSocket to the realtime service.
///
/// The upstream is dialled before the inbound upgrade is accepted, so an
/// unreachable upstream is reported as an HTTP error and no client socket is
/// ever opened for it.
pub async fn relay(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let upgrade = upgrade.map_err(|rejection| {
        tracing::debug!(reason = %rejection.body_text(), "Relay request without upgrade");
        ApiError::UpgradeRequired
    })?;
    let connector = state.upstream.clone().ok_or(RelayError::NotConfigured)?;

    let mut session = RelaySession::new(state.relay_metrics.clone());
    let upstream = session.connect(connector.as_ref()).await?;
    tracing::info!(session_id = %session.id(), principal = %principal, "Upgrading relay connection");

    Ok(upgrade
        .on_failed_upgrade(|err| tracing::warn!(error = %err, "Client upgrade failed"))
        .on_upgrade(move |socket| async move {
            session.run(from_axum(socket), upstream).await;
        }))
}
