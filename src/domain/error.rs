//! Errors surfaced by the rate limiter and the realtime relay.

use crate::domain::key::RateLimitKey;
use crate::domain::session::Side;
use std::time::Duration;

/// Machine-readable code carried by every rate limit rejection.
pub const RATE_LIMITED_CODE: &str = "RATE_LIMITED";

/// HTTP status for a rate limit rejection (Too Many Requests).
pub const RATE_LIMITED_STATUS: u16 = 429;

/// The request exceeded its sliding-window quota.
///
/// Callers are expected to translate this into a rejected request; retrying
/// after `retry_after` will succeed if no other requests are made meanwhile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// More than `limit` requests were made for `key` inside the window
    #[error(
        "too many {} requests, try again in {}s",
        .feature.as_deref().unwrap_or("consecutive"),
        whole_seconds(.retry_after)
    )]
    TooManyRequests {
        /// Bucket that was over its limit
        key: RateLimitKey,
        /// Feature label from the options, if one was given
        feature: Option<String>,
        /// Configured limit per window
        limit: u32,
        /// Time until a request would be admitted again
        retry_after: Duration,
    },
}

impl RateLimitError {
    /// HTTP status code callers should respond with.
    pub fn status(&self) -> u16 {
        RATE_LIMITED_STATUS
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        RATE_LIMITED_CODE
    }

    /// Time until a request would be admitted again.
    pub fn retry_after(&self) -> Duration {
        match self {
            RateLimitError::TooManyRequests { retry_after, .. } => *retry_after,
        }
    }

    /// `retry_after` rounded up to whole seconds, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        whole_seconds(&self.retry_after())
    }

    /// The configured limit that was exceeded.
    pub fn limit(&self) -> u32 {
        match self {
            RateLimitError::TooManyRequests { limit, .. } => *limit,
        }
    }

    /// The key that was over its limit.
    pub fn key(&self) -> &RateLimitKey {
        match self {
            RateLimitError::TooManyRequests { key, .. } => key,
        }
    }
}

fn whole_seconds(duration: &Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// Failures of the realtime relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Upstream endpoint or credentials are missing from configuration
    #[error("realtime relay is not configured")]
    NotConfigured,
    /// The configured upstream endpoint or credentials are malformed
    #[error("invalid upstream configuration: {0}")]
    InvalidUpstream(String),
    /// The upstream could not be reached or the handshake failed
    #[error("upstream connection failed: {0}")]
    UpstreamUnavailable(String),
    /// The upstream answered the handshake with a non-101 status
    #[error("upstream rejected the connection with status {status}")]
    UpstreamRejected {
        /// HTTP status returned by the upstream
        status: u16,
    },
    /// A socket failed while relaying
    #[error("{side} socket error: {reason}")]
    Socket {
        /// Which socket failed
        side: Side,
        /// Error description from the socket library
        reason: String,
    },
}

impl RelayError {
    /// Socket error on `side`.
    pub fn socket(side: Side, err: impl std::fmt::Display) -> Self {
        RelayError::Socket {
            side,
            reason: err.to_string(),
        }
    }

    /// HTTP status code the handler responds with.
    pub fn status(&self) -> u16 {
        match self {
            RelayError::NotConfigured | RelayError::InvalidUpstream(_) => 500,
            RelayError::UpstreamUnavailable(_)
            | RelayError::UpstreamRejected { .. }
            | RelayError::Socket { .. } => 502,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::NotConfigured | RelayError::InvalidUpstream(_) => "RELAY_NOT_CONFIGURED",
            RelayError::UpstreamUnavailable(_) | RelayError::UpstreamRejected { .. } => {
                "UPSTREAM_UNAVAILABLE"
            }
            RelayError::Socket { .. } => "RELAY_SOCKET_ERROR",
        }
    }
}
