//! Bidirectional frame relay between a client and the upstream service.
//!
//! A session owns one client socket and one upstream socket. Two forwarding
//! loops run concurrently inside a single task. Whichever finishes first
//! decides the session's [`Termination`]; the other loop is dropped and both
//! sockets receive the resulting close frame.
//!
//! Each loop awaits delivery of a frame before reading the next one, so a
//! slow receiver throttles its sender instead of growing a buffer.

use crate::application::metrics::RelayMetrics;
use crate::application::ports::{BoxedSocket, UpstreamConnector};
use crate::domain::error::RelayError;
use crate::domain::frame::Frame;
use crate::domain::session::{SessionId, SessionState, Side, Termination, TransitionError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;

/// How long to wait for a socket to accept the final close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One client/upstream pairing.
#[derive(Debug)]
pub struct RelaySession {
    id: SessionId,
    state: SessionState,
    metrics: RelayMetrics,
}

impl RelaySession {
    /// Create a session in the `Init` state.
    pub fn new(metrics: RelayMetrics) -> Self {
        Self {
            id: SessionId::next(),
            state: SessionState::Init,
            metrics,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    /// Returns `TransitionError` if the move goes backwards or leaves `Closed`.
    pub fn transition(&mut self, next: SessionState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "Relay session transition");
        self.state = next;
        Ok(())
    }

    /// Open the upstream socket through `connector`.
    ///
    /// On failure the session is closed and the failure is counted.
    ///
    /// # Errors
    /// Returns the connector's `RelayError`.
    pub async fn connect(
        &mut self,
        connector: &dyn UpstreamConnector,
    ) -> Result<BoxedSocket, RelayError> {
        self.enter(SessionState::ConnectingUpstream);
        match connector.connect().await {
            Ok(socket) => Ok(socket),
            Err(err) => {
                self.metrics.record_upstream_failure();
                tracing::warn!(session_id = %self.id, error = %err, "Upstream connection failed");
                self.enter(SessionState::Closed);
                Err(err)
            }
        }
    }

    /// Relay frames until either side closes, fails or disconnects.
    ///
    /// Both sockets are sent the termination's close frame and closed before
    /// this returns.
    pub async fn run(mut self, client: BoxedSocket, upstream: BoxedSocket) -> Termination {
        if self.state == SessionState::Init {
            self.enter(SessionState::ConnectingUpstream);
        }
        self.enter(SessionState::Relaying);
        self.metrics.record_opened();
        tracing::info!(session_id = %self.id, "Relay session started");

        let (mut client_tx, mut client_rx) = client.split();
        let (mut upstream_tx, mut upstream_rx) = upstream.split();

        let termination = tokio::select! {
            t = forward(Side::Client, &mut client_rx, &mut upstream_tx, &self.metrics) => t,
            t = forward(Side::Upstream, &mut upstream_rx, &mut client_tx, &self.metrics) => t,
        };

        let close = Frame::Close(termination.close_frame());
        tokio::join!(
            close_quietly(&mut client_tx, close.clone()),
            close_quietly(&mut upstream_tx, close),
        );

        self.enter(SessionState::Closed);
        self.metrics.record_closed();
        match &termination {
            Termination::Failed { side, reason } => tracing::warn!(
                session_id = %self.id,
                side = %side,
                reason = %reason,
                "Relay session failed"
            ),
            other => tracing::info!(
                session_id = %self.id,
                side = %other.side(),
                close = ?other.close_frame(),
                "Relay session ended"
            ),
        }
        termination
    }

    fn enter(&mut self, next: SessionState) {
        if let Err(err) = self.transition(next) {
            tracing::debug!(session_id = %self.id, error = %err, "Ignoring session transition");
        }
    }
}

/// Copy frames from `from`'s stream into the opposite side's sink.
async fn forward(
    from: Side,
    rx: &mut SplitStream<BoxedSocket>,
    tx: &mut SplitSink<BoxedSocket, Frame>,
    metrics: &RelayMetrics,
) -> Termination {
    loop {
        let frame = match rx.next().await {
            Some(Ok(Frame::Close(frame))) => return Termination::Closed { side: from, frame },
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                return Termination::Failed {
                    side: from,
                    reason: err.to_string(),
                }
            }
            None => return Termination::Ended { side: from },
        };

        if let Err(err) = tx.send(frame).await {
            return Termination::Failed {
                side: from.opposite(),
                reason: err.to_string(),
            };
        }
        match from {
            Side::Client => metrics.record_frame_to_upstream(),
            Side::Upstream => metrics.record_frame_to_client(),
        }
    }
}

async fn close_quietly(tx: &mut SplitSink<BoxedSocket, Frame>, frame: Frame) {
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
        let _ = tx.send(frame).await;
        let _ = tx.close().await;
    })
    .await;
}
