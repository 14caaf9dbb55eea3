//! In-memory relay socket for testing.

use crate::domain::error::RelayError;
use crate::domain::frame::Frame;
use crate::domain::session::Side;
use futures_util::{Sink, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Socket half handed to the code under test.
///
/// Frames pushed by the paired [`MockPeer`] are yielded by the stream, and
/// frames sent into the sink are delivered to the peer.
///
/// # Examples
///
/// ```ignore
/// use realtor_gate::infrastructure::mocks::MockSocket;
/// use realtor_gate::domain::{frame::Frame, session::Side};
/// use futures_util::{SinkExt, StreamExt};
///
/// let (mut socket, mut peer) = MockSocket::pair(Side::Client);
/// peer.send("ping");
/// assert_eq!(socket.next().await.unwrap().unwrap(), Frame::from("ping"));
///
/// socket.send(Frame::from("pong")).await.unwrap();
/// assert_eq!(peer.recv().await, Some(Frame::from("pong")));
/// ```
#[derive(Debug)]
pub struct MockSocket {
    side: Side,
    incoming: mpsc::UnboundedReceiver<Result<Frame, RelayError>>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

/// Test-side handle of a [`MockSocket`].
#[derive(Debug)]
pub struct MockPeer {
    side: Side,
    tx: Option<mpsc::UnboundedSender<Result<Frame, RelayError>>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MockSocket {
    /// Create a socket for `side` and the peer that drives it.
    pub fn pair(side: Side) -> (MockSocket, MockPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MockSocket {
                side,
                incoming: in_rx,
                outgoing: out_tx,
            },
            MockPeer {
                side,
                tx: Some(in_tx),
                rx: out_rx,
            },
        )
    }
}

impl Stream for MockSocket {
    type Item = Result<Frame, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<Frame> for MockSocket {
    type Error = RelayError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        self.outgoing
            .send(item)
            .map_err(|_| RelayError::socket(self.side, "peer dropped"))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

impl MockPeer {
    /// Deliver a frame to the socket.
    pub fn send(&self, frame: impl Into<Frame>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(frame.into()));
        }
    }

    /// Make the socket yield a read error.
    pub fn fail(&self, reason: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(RelayError::socket(self.side, reason)));
        }
    }

    /// End the socket's stream without a close frame.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Receive the next frame the socket sent, or `None` once it is dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Drain every frame sent so far without waiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
