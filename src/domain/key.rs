//! Rate limit keys.
//!
//! A key identifies one bucket of request timestamps. Keys are composed as
//! `<feature>:<identifier>`, for example `realtime-session:user-42`, so that
//! the same caller is counted independently per feature.

use std::borrow::Borrow;
use std::fmt;

/// Separator between the feature label and the identifier.
pub const KEY_SEPARATOR: char = ':';

/// Identifies a rate limit bucket.
///
/// Two requests share a bucket if and only if their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Compose a key from a feature label and a caller identifier.
    ///
    /// # Example
    /// ```
    /// use realtor_gate::RateLimitKey;
    ///
    /// let key = RateLimitKey::new("realtime-session", "user-42");
    /// assert_eq!(key.as_str(), "realtime-session:user-42");
    /// assert_eq!(key.feature(), Some("realtime-session"));
    /// ```
    pub fn new(feature: &str, identifier: &str) -> Self {
        let mut raw = String::with_capacity(feature.len() + identifier.len() + 1);
        raw.push_str(feature);
        raw.push(KEY_SEPARATOR);
        raw.push_str(identifier);
        Self(raw)
    }

    /// The full key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The feature part of the key, if the key was composed with a separator.
    pub fn feature(&self) -> Option<&str> {
        self.0.split_once(KEY_SEPARATOR).map(|(feature, _)| feature)
    }

    /// The identifier part of the key, if the key was composed with a separator.
    pub fn identifier(&self) -> Option<&str> {
        self.0.split_once(KEY_SEPARATOR).map(|(_, id)| id)
    }

    /// Consume the key and return the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RateLimitKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for RateLimitKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<&RateLimitKey> for RateLimitKey {
    fn from(key: &RateLimitKey) -> Self {
        key.clone()
    }
}

impl Borrow<str> for RateLimitKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
