//! Outbound connection to the realtime service.

use crate::application::ports::{BoxedSocket, UpstreamConnector};
use crate::domain::error::RelayError;
use crate::domain::session::Side;
use crate::infrastructure::socket::from_tungstenite;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Default value of the `OpenAI-Beta` handshake header.
pub const REALTIME_BETA_HEADER: &str = "realtime=v1";

/// Default bound on the upstream handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the realtime API over tokio-tungstenite.
#[derive(Clone)]
pub struct TungsteniteConnector {
    url: String,
    api_key: String,
    beta: Option<String>,
    connect_timeout: Duration,
}

impl fmt::Debug for TungsteniteConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TungsteniteConnector")
            .field("url", &self.url)
            .field("beta", &self.beta)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl TungsteniteConnector {
    /// Create a connector for `url` authenticating with `api_key`.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            beta: Some(REALTIME_BETA_HEADER.to_owned()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound the handshake duration.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Value of the `OpenAI-Beta` header, or `None` to leave it out.
    ///
    /// Defaults to [`REALTIME_BETA_HEADER`].
    pub fn with_beta_header(mut self, beta: Option<String>) -> Self {
        self.beta = beta;
        self
    }

    /// Upstream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn handshake_request(&self) -> Result<Request, RelayError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| RelayError::InvalidUpstream(err.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| RelayError::InvalidUpstream("api key is not a valid header value".into()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", bearer);
        if let Some(beta) = &self.beta {
            let beta = HeaderValue::from_str(beta)
                .map_err(|_| RelayError::InvalidUpstream("beta header is not a valid header value".into()))?;
            headers.insert("OpenAI-Beta", beta);
        }
        Ok(request)
    }
}

#[async_trait]
impl UpstreamConnector for TungsteniteConnector {
    async fn connect(&self) -> Result<BoxedSocket, RelayError> {
        let request = self.handshake_request()?;

        let connected =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RelayError::UpstreamUnavailable("handshake timed out".into()))?;

        match connected {
            Ok((stream, response)) => {
                tracing::debug!(url = %self.url, status = %response.status(), "Upstream connected");
                Ok(from_tungstenite(stream, Side::Upstream))
            }
            Err(WsError::Http(response)) => Err(RelayError::UpstreamRejected {
                status: response.status().as_u16(),
            }),
            Err(err) => Err(RelayError::UpstreamUnavailable(err.to_string())),
        }
    }
}
