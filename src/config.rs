//! Service configuration read from the environment at startup.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `REALTOR_GATE_ADDR` | `0.0.0.0:3000` |
//! | `REALTOR_GATE_SECRET` | required |
//! | `REALTIME_UPSTREAM_URL` | [`DEFAULT_UPSTREAM_URL`] |
//! | `REALTIME_API_KEY` | unset (relay disabled) |
//! | `REALTIME_BETA_HEADER` | `realtime=v1`; `none` omits the header |
//! | `REALTIME_SESSION_LIMIT` | `10` |
//! | `REALTIME_SESSION_WINDOW_MS` | `60000` |
//! | `RATE_LIMIT_MAX_BUCKETS` | `10000` |
//! | `RATE_LIMIT_SWEEP_INTERVAL_MS` | `60000` |
//! | `REDIS_URL` | unset (in-process buckets) |

use crate::application::sweeper::SweeperConfig;
use crate::domain::policy::RateLimitOptions;
use crate::infrastructure::builder::DEFAULT_MAX_BUCKETS;
use crate::infrastructure::http::state::{
    DEFAULT_SESSION_LIMIT, DEFAULT_SESSION_WINDOW, SESSION_LABEL,
};
use crate::infrastructure::upstream::REALTIME_BETA_HEADER;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default realtime endpoint.
pub const DEFAULT_UPSTREAM_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview";

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Error raised for missing or malformed configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("{0} must be set")]
    Missing(&'static str),
    /// A variable could not be parsed or failed validation
    #[error("invalid {name}={value:?}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Credentials and endpoint of the realtime service.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// WebSocket URL
    pub url: String,
    /// Bearer key sent on the handshake
    pub api_key: String,
    /// `OpenAI-Beta` header value, `None` to omit it
    pub beta: Option<String>,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("beta", &self.beta)
            .finish_non_exhaustive()
    }
}

/// Complete service configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds
    pub addr: SocketAddr,
    /// Shared secret required on `/api/realtime/*`
    pub secret: String,
    /// Realtime service, if the relay is enabled
    pub upstream: Option<UpstreamConfig>,
    /// Quota on session issuance
    pub session_options: RateLimitOptions,
    /// Bound on in-process buckets
    pub max_buckets: usize,
    /// Idle bucket sweep schedule
    pub sweeper: SweeperConfig,
    /// Redis connection string for shared buckets
    pub redis_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("addr", &self.addr)
            .field("upstream", &self.upstream)
            .field("session_options", &self.session_options)
            .field("max_buckets", &self.max_buckets)
            .field("sweeper", &self.sweeper)
            .field("redis_url", &self.redis_url.as_ref().map(|_| ".."))
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError` if the secret is missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    /// Returns `ConfigError` if the secret is missing or a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let addr = parse_or(&get, "REALTOR_GATE_ADDR", || {
            SocketAddr::from_str(DEFAULT_ADDR).map_err(|err| ConfigError::Invalid {
                name: "REALTOR_GATE_ADDR",
                value: DEFAULT_ADDR.to_owned(),
                reason: err.to_string(),
            })
        })?;

        let secret = get("REALTOR_GATE_SECRET").ok_or(ConfigError::Missing("REALTOR_GATE_SECRET"))?;

        let upstream = match get("REALTIME_API_KEY") {
            Some(api_key) => Some(UpstreamConfig {
                url: get("REALTIME_UPSTREAM_URL")
                    .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_owned()),
                api_key,
                beta: match get("REALTIME_BETA_HEADER") {
                    Some(value) if value.trim().eq_ignore_ascii_case("none") => None,
                    Some(value) => Some(value),
                    None => Some(REALTIME_BETA_HEADER.to_owned()),
                },
            }),
            None => {
                tracing::info!("REALTIME_API_KEY not set, realtime relay disabled");
                None
            }
        };

        let session_limit = parse_or(&get, "REALTIME_SESSION_LIMIT", || Ok(DEFAULT_SESSION_LIMIT))?;
        let session_window_ms = parse_or(&get, "REALTIME_SESSION_WINDOW_MS", || {
            Ok(DEFAULT_SESSION_WINDOW.as_millis() as u64)
        })?;
        let session_options = RateLimitOptions::from_millis(session_limit, session_window_ms)
            .map_err(|err| ConfigError::Invalid {
                name: "REALTIME_SESSION_LIMIT/REALTIME_SESSION_WINDOW_MS",
                value: format!("{session_limit}/{session_window_ms}"),
                reason: err.to_string(),
            })?
            .with_feature(SESSION_LABEL);

        let max_buckets = parse_or(&get, "RATE_LIMIT_MAX_BUCKETS", || Ok(DEFAULT_MAX_BUCKETS))?;
        if max_buckets == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMIT_MAX_BUCKETS",
                value: "0".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let sweep_ms = parse_or(&get, "RATE_LIMIT_SWEEP_INTERVAL_MS", || {
            Ok(DEFAULT_SWEEP_INTERVAL.as_millis() as u64)
        })?;
        let sweeper =
            SweeperConfig::new(Duration::from_millis(sweep_ms)).map_err(|err| {
                ConfigError::Invalid {
                    name: "RATE_LIMIT_SWEEP_INTERVAL_MS",
                    value: sweep_ms.to_string(),
                    reason: err.to_string(),
                }
            })?;

        let redis_url = get("REDIS_URL");
        if redis_url.is_none() {
            tracing::info!("REDIS_URL not set, rate limit buckets kept in process");
        }

        Ok(Self {
            addr,
            secret,
            upstream,
            session_options,
            max_buckets,
            sweeper,
            redis_url,
        })
    }
}

fn parse_or<T, G, D>(get: &G, name: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
    D: FnOnce() -> Result<T, ConfigError>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: err.to_string(),
        }),
        None => default(),
    }
}
