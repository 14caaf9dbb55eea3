//! State shared by every handler: the limiter, the session quota, the relay
//! connector and the shared secret.

use crate::application::limiter::RequestLimiter;
use crate::application::metrics::RelayMetrics;
use crate::application::ports::UpstreamConnector;
use crate::domain::policy::RateLimitOptions;
use crate::infrastructure::http::auth::SharedSecret;
use std::sync::Arc;
use std::time::Duration;

/// Default number of realtime sessions a caller may open per window.
pub const DEFAULT_SESSION_LIMIT: u32 = 10;

/// Default realtime session window.
pub const DEFAULT_SESSION_WINDOW: Duration = Duration::from_secs(60);

/// Feature label for realtime session rate limiting.
pub const SESSION_FEATURE: &str = "realtime-session";

/// Label used in rejection messages for realtime sessions.
pub const SESSION_LABEL: &str = "realtime session";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub(crate) limiter: Arc<dyn RequestLimiter>,
    pub(crate) session_options: RateLimitOptions,
    pub(crate) upstream: Option<Arc<dyn UpstreamConnector>>,
    pub(crate) relay_metrics: RelayMetrics,
    pub(crate) secret: SharedSecret,
}

impl AppState {
    /// Create state with the default session quota and no upstream.
    pub fn new(limiter: Arc<dyn RequestLimiter>, secret: SharedSecret) -> Self {
        Self {
            limiter,
            session_options: default_session_options(),
            upstream: None,
            relay_metrics: RelayMetrics::new(),
            secret,
        }
    }

    /// Set the quota applied to `POST /api/realtime/session`.
    pub fn with_session_options(mut self, options: RateLimitOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Set the connector used to reach the realtime service.
    pub fn with_upstream(mut self, connector: Arc<dyn UpstreamConnector>) -> Self {
        self.upstream = Some(connector);
        self
    }

    /// Share an existing relay metrics tracker.
    pub fn with_relay_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.relay_metrics = metrics;
        self
    }

    /// Relay metrics recorded by the WebSocket handler.
    pub fn relay_metrics(&self) -> &RelayMetrics {
        &self.relay_metrics
    }
}

/// Session quota used when none is configured.
pub fn default_session_options() -> RateLimitOptions {
    RateLimitOptions::new(DEFAULT_SESSION_LIMIT, DEFAULT_SESSION_WINDOW)
        .expect("default session quota of 10 per 60s is always valid")
        .with_feature(SESSION_LABEL)
}
