//! Shared-secret authentication and caller identification.
//!
//! Every `/api/realtime/*` request must present `Authorization: Bearer
//! <secret>`. The caller identity used for rate limiting comes from the
//! first of `x-user-id`, `x-forwarded-for` (first hop) or `x-real-ip`.

use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header set by the session layer in front of the gate.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity used when no caller header is present.
pub const ANONYMOUS: &str = "anonymous";

/// The bearer secret callers must present.
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    /// Wrap `secret`.
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }

    /// Compare `presented` against the secret in constant time.
    pub fn verify(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    /// Check the `Authorization` header of a request.
    ///
    /// The scheme name is matched case-insensitively (RFC 7235).
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .is_some_and(|token| self.verify(token))
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Identifier of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(String);

impl Principal {
    /// Derive the caller identity from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(USER_ID_HEADER)
            .or_else(|| {
                header("x-forwarded-for")
                    .and_then(|value| value.split(',').next())
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            })
            .or_else(|| header("x-real-ip"))
            .unwrap_or(ANONYMOUS);

        Self(id.to_owned())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extractor that rejects unauthenticated requests with 401.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.secret.authorize(&parts.headers) {
            tracing::debug!(path = %parts.uri.path(), "Rejected unauthenticated request");
            return Err(ApiError::Unauthorized);
        }
        Ok(Authenticated(Principal::from_headers(&parts.headers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_secret_verification() {
        let secret = SharedSecret::new("s3cret");
        assert!(secret.verify("s3cret"));
        assert!(!secret.verify("s3cre"));
        assert!(!secret.verify("s3cret!"));
        assert!(!secret.verify(""));
    }

    #[test]
    fn test_authorize_requires_bearer_scheme() {
        let secret = SharedSecret::new("s3cret");
        assert!(secret.authorize(&headers(&[("authorization", "Bearer s3cret")])));
        assert!(!secret.authorize(&headers(&[("authorization", "Basic s3cret")])));
        assert!(!secret.authorize(&headers(&[("authorization", "Bearer wrong")])));
        assert!(!secret.authorize(&HeaderMap::new()));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let secret = SharedSecret::new("s3cret");
        for value in ["bearer s3cret", "BEARER s3cret", "BeArEr  s3cret"] {
            assert!(secret.authorize(&headers(&[("authorization", value)])), "{value}");
        }
        assert!(!secret.authorize(&headers(&[("authorization", "Bearers3cret")])));
        assert!(!secret.authorize(&headers(&[("authorization", "bearer")])));
    }

    #[test]
    fn test_principal_precedence() {
        let all = headers(&[
            ("x-user-id", "user-7"),
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "10.0.0.3"),
        ]);
        assert_eq!(Principal::from_headers(&all).as_str(), "user-7");

        let forwarded = headers(&[
            ("x-forwarded-for", " 10.0.0.1 , 10.0.0.2"),
            ("x-real-ip", "10.0.0.3"),
        ]);
        assert_eq!(Principal::from_headers(&forwarded).as_str(), "10.0.0.1");

        let real_ip = headers(&[("x-real-ip", "10.0.0.3")]);
        assert_eq!(Principal::from_headers(&real_ip).as_str(), "10.0.0.3");

        assert_eq!(Principal::from_headers(&HeaderMap::new()).as_str(), ANONYMOUS);
    }

    #[test]
    fn test_debug_hides_secret() {
        assert_eq!(format!("{:?}", SharedSecret::new("s3cret")), "SharedSecret(..)");
    }
}
