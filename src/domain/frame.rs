//! Relay frames.
//!
//! The relay forwards data frames without looking inside them. `Frame` is the
//! socket-library-neutral representation that both the inbound (axum) and
//! outbound (tungstenite) adapters convert to and from.

use std::borrow::Cow;
use std::fmt;

/// Close codes used by the relay (RFC 6455 section 7.4.1).
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away
    pub const AWAY: u16 = 1001;
    /// No status code present; never sent on the wire
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame; never sent on the wire
    pub const ABNORMAL: u16 = 1006;
    /// Unexpected condition on the server
    pub const ERROR: u16 = 1011;
    /// TLS handshake failure; never sent on the wire
    pub const TLS: u16 = 1015;
}

/// Code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code
    pub code: u16,
    /// Human-readable reason (at most 123 bytes on the wire)
    pub reason: Cow<'static, str>,
}

impl CloseFrame {
    /// Create a close frame.
    pub fn new(code: u16, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure with an empty reason.
    pub fn normal() -> Self {
        Self::new(close_code::NORMAL, "")
    }

    /// Whether the code may legally appear in a close frame on the wire.
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting and must not be
    /// sent, so such frames are replaced before forwarding.
    pub fn is_sendable(&self) -> bool {
        !matches!(
            self.code,
            close_code::NO_STATUS | close_code::ABNORMAL | close_code::TLS
        ) && self.code >= 1000
    }

    /// A copy of this frame safe to send to a peer.
    pub fn sendable(&self) -> Self {
        if self.is_sendable() {
            self.clone()
        } else {
            Self::new(close_code::NORMAL, self.reason.clone())
        }
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// A message exchanged over a relayed socket.
///
/// Ping and pong control frames are handled by each socket library and are
/// never represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload
    Text(String),
    /// Binary payload
    Binary(Vec<u8>),
    /// Close handshake, optionally with a code and reason
    Close(Option<CloseFrame>),
}

impl Frame {
    /// Check if this is a close frame.
    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close(_))
    }

    /// Payload length in bytes (zero for close frames).
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
            Frame::Close(_) => 0,
        }
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame::Binary(bytes)
    }
}
