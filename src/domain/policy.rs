//! Sliding-window rate limit policy.
//!
//! A policy is the pair `(limit, window)` plus an optional feature label used
//! when reporting a rejection. Policies are passed per call, so different
//! features can share one bucket store while enforcing different quotas.

use std::borrow::Cow;
use std::time::Duration;

/// Error returned when a policy is constructed with invalid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The limit must allow at least one request per window
    #[error("limit must be greater than 0")]
    ZeroLimit,
    /// The window must have a non-zero length
    #[error("window duration must be greater than 0")]
    ZeroWindow,
}

/// Decision made by evaluating a bucket against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The request is admitted; `remaining` more requests fit in the window
    Allow {
        /// Requests still available in the current window
        remaining: u32,
    },
    /// The request is over the limit
    Reject {
        /// Time until the oldest counted request leaves the window
        retry_after: Duration,
    },
}

impl PolicyDecision {
    /// Check if this decision admits the request.
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow { .. })
    }

    /// Check if this decision rejects the request.
    pub fn is_reject(&self) -> bool {
        matches!(self, PolicyDecision::Reject { .. })
    }
}

/// Per-call rate limit options: at most `limit` requests per `window`.
///
/// # Example
/// ```
/// use realtor_gate::RateLimitOptions;
/// use std::time::Duration;
///
/// let options = RateLimitOptions::new(3, Duration::from_secs(1))
///     .unwrap()
///     .with_feature("realtime session");
///
/// assert_eq!(options.limit(), 3);
/// assert_eq!(options.feature(), Some("realtime session"));
/// assert!(RateLimitOptions::new(0, Duration::from_secs(1)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitOptions {
    limit: u32,
    window: Duration,
    feature: Option<Cow<'static, str>>,
}

impl RateLimitOptions {
    /// Create options allowing `limit` requests per `window`.
    ///
    /// # Errors
    /// Returns `PolicyError::ZeroLimit` or `PolicyError::ZeroWindow` for
    /// degenerate parameters.
    pub fn new(limit: u32, window: Duration) -> Result<Self, PolicyError> {
        if limit == 0 {
            return Err(PolicyError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        Ok(Self {
            limit,
            window,
            feature: None,
        })
    }

    /// Create options with the window given in milliseconds.
    pub fn from_millis(limit: u32, window_ms: u64) -> Result<Self, PolicyError> {
        Self::new(limit, Duration::from_millis(window_ms))
    }

    /// Attach a human-readable feature label used in rejection messages.
    pub fn with_feature(mut self, feature: impl Into<Cow<'static, str>>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Maximum number of requests per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Feature label, if any.
    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_options() {
        let options = RateLimitOptions::from_millis(5, 1_000).unwrap();
        assert_eq!(options.limit(), 5);
        assert_eq!(options.window(), Duration::from_secs(1));
        assert_eq!(options.feature(), None);
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert_eq!(
            RateLimitOptions::new(0, Duration::from_secs(1)),
            Err(PolicyError::ZeroLimit)
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        assert_eq!(
            RateLimitOptions::from_millis(1, 0),
            Err(PolicyError::ZeroWindow)
        );
    }

    #[test]
    fn test_feature_label() {
        let owned = RateLimitOptions::from_millis(1, 10)
            .unwrap()
            .with_feature(String::from("chat"));
        assert_eq!(owned.feature(), Some("chat"));
    }

    #[test]
    fn test_decision_helpers() {
        assert!(PolicyDecision::Allow { remaining: 0 }.is_allow());
        assert!(PolicyDecision::Reject {
            retry_after: Duration::ZERO
        }
        .is_reject());
    }
}
