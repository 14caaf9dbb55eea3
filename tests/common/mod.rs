//! Helpers shared by the integration tests.

#![allow(dead_code)]

use axum::http::HeaderMap;
use realtor_gate::infrastructure::http::{router, AppState, SharedSecret};
use realtor_gate::{
    RateLimitOptions, RateLimiterBuilder, RelayMetrics, RequestLimiter,
    TungsteniteConnector, UpstreamConnector,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const SECRET: &str = "test-secret";
pub const API_KEY: &str = "sk-test";

pub fn limiter() -> Arc<dyn RequestLimiter> {
    Arc::new(RateLimiterBuilder::new().build().unwrap())
}

/// Gate state with a 3-per-second session quota.
pub fn state(upstream_url: Option<&str>) -> AppState {
    let mut state = AppState::new(limiter(), SharedSecret::new(SECRET)).with_session_options(
        RateLimitOptions::from_millis(3, 1_000)
            .unwrap()
            .with_feature("realtime session"),
    );
    if let Some(url) = upstream_url {
        let connector: Arc<dyn UpstreamConnector> =
            Arc::new(TungsteniteConnector::new(url, API_KEY).with_connect_timeout(Duration::from_secs(2)));
        state = state.with_upstream(connector);
    }
    state
}

/// Serve the gate on an ephemeral port.
pub async fn spawn_gate(state: AppState) -> (SocketAddr, RelayMetrics) {
    let metrics = state.relay_metrics().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (addr, metrics)
}

/// A fake realtime service accepting one connection.
pub struct FakeUpstream {
    pub url: String,
    pub handshake_headers: oneshot::Receiver<HeaderMap>,
}

pub async fn spawn_upstream<F, Fut>(handler: F) -> FakeUpstream
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (headers_tx, headers_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = headers_tx.send(request.headers().clone());
            Ok(response)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        handler(ws).await;
    });

    FakeUpstream {
        url: format!("ws://{addr}/v1/realtime"),
        handshake_headers: headers_rx,
    }
}

/// An address nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/v1/realtime")
}

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the relay as a browser would, presenting `secret`.
pub async fn connect_client(
    gate: SocketAddr,
    secret: &str,
) -> Result<ClientSocket, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{gate}/api/realtime/ws")
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {secret}")).unwrap(),
    );
    let (socket, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(socket)
}
