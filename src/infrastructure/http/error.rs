//! Mapping of gate errors onto HTTP responses.

use crate::domain::error::{RateLimitError, RelayError};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Header carrying the configured limit.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Header carrying the requests left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the wait, in whole seconds, before retrying.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable description
    pub message: String,
}

/// Any error a handler can respond with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or wrong shared secret
    #[error("missing or invalid credentials")]
    Unauthorized,
    /// The request was not a WebSocket upgrade
    #[error("websocket upgrade required")]
    UpgradeRequired,
    /// The caller is over its quota
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    /// The relay could not be set up
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ApiError {
    /// HTTP status of the response.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            ApiError::RateLimited(err) => status_from(err.status()),
            ApiError::Relay(err) => status_from(err.status()),
        }
    }

    /// Machine-readable code of the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::UpgradeRequired => "UPGRADE_REQUIRED",
            ApiError::RateLimited(err) => err.code(),
            ApiError::Relay(err) => err.code(),
        }
    }
}

fn status_from(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Set the quota headers shared by admitted and rejected requests.
pub fn insert_quota_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let ApiError::RateLimited(err) = &self {
            let headers = response.headers_mut();
            insert_quota_headers(headers, err.limit(), 0);
            headers.insert(RETRY_AFTER_HEADER, HeaderValue::from(err.retry_after_secs()));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::key::RateLimitKey;
    use std::time::Duration;

    fn rate_limited(retry_after: Duration) -> ApiError {
        ApiError::RateLimited(RateLimitError::TooManyRequests {
            key: RateLimitKey::new("realtime-session", "u1"),
            feature: Some("realtime session".into()),
            limit: 3,
            retry_after,
        })
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let response = rate_limited(Duration::from_millis(1_200)).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers[LIMIT_HEADER], "3");
        assert_eq!(headers[REMAINING_HEADER], "0");
        assert_eq!(headers[RETRY_AFTER_HEADER], "2");
    }

    #[test]
    fn test_short_retry_rounds_up_to_one_second() {
        let response = rate_limited(Duration::from_millis(1)).into_response();
        assert_eq!(response.headers()[RETRY_AFTER_HEADER], "1");
    }

    #[test]
    fn test_relay_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(RelayError::NotConfigured).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(RelayError::UpstreamRejected { status: 403 }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::UpgradeRequired.status().as_u16(), 426);
        assert_eq!(ApiError::Unauthorized.code(), "UNAUTHORIZED");
    }
}
