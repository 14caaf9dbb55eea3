//! Relay session lifecycle.
//!
//! A session pairs one client socket with one upstream socket. Its state only
//! ever moves forward:
//!
//! ```text
//! Init -> ConnectingUpstream -> Relaying -> Closed
//!   \_____________\_______________________/^
//! ```
//!
//! Any failure jumps straight to `Closed`. Closed sessions are never reused;
//! a dropped conversation requires the client to connect again.

use crate::domain::frame::{close_code, CloseFrame};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique relay session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing attempted yet
    Init,
    /// Opening the outbound connection
    ConnectingUpstream,
    /// Both sockets open, frames flowing
    Relaying,
    /// Terminal
    Closed,
}

impl SessionState {
    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, ConnectingUpstream)
                | (ConnectingUpstream, Relaying)
                | (Init | ConnectingUpstream | Relaying, Closed)
        )
    }

    /// Check whether the session is finished.
    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::ConnectingUpstream => "connecting_upstream",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Error returned for an illegal state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition from {from} to {to}")]
pub struct TransitionError {
    /// State before the attempted transition
    pub from: SessionState,
    /// Requested state
    pub to: SessionState,
}

/// Which socket of a session an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The inbound browser connection
    Client,
    /// The third-party realtime service
    Upstream,
}

impl Side {
    /// The other socket of the pair.
    pub fn opposite(self) -> Side {
        match self {
            Side::Client => Side::Upstream,
            Side::Upstream => Side::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Upstream => f.write_str("upstream"),
        }
    }
}

/// Why a relaying session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// `side` sent a close frame
    Closed {
        /// Socket that initiated the close
        side: Side,
        /// Close frame as received, if it carried one
        frame: Option<CloseFrame>,
    },
    /// `side` failed while reading or accepting a frame
    Failed {
        /// Socket that failed
        side: Side,
        /// Error description
        reason: String,
    },
    /// `side` stopped producing frames without a close handshake
    Ended {
        /// Socket whose stream ended
        side: Side,
    },
}

impl Termination {
    /// Socket that caused the termination.
    pub fn side(&self) -> Side {
        match self {
            Termination::Closed { side, .. }
            | Termination::Failed { side, .. }
            | Termination::Ended { side } => *side,
        }
    }

    /// Close frame to send to both sockets.
    ///
    /// A peer close is propagated with its own code and reason. Errors close
    /// with 1011 and abrupt ends with 1001.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        match self {
            Termination::Closed { frame, .. } => frame.as_ref().map(CloseFrame::sendable),
            Termination::Failed { side, .. } => {
                Some(CloseFrame::new(close_code::ERROR, format!("{side} error")))
            }
            Termination::Ended { side } => Some(CloseFrame::new(
                close_code::AWAY,
                format!("{side} disconnected"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use SessionState::*;
        assert!(Init.can_transition_to(ConnectingUpstream));
        assert!(ConnectingUpstream.can_transition_to(Relaying));
        assert!(Relaying.can_transition_to(Closed));
    }

    #[test]
    fn test_error_transitions_go_to_closed() {
        use SessionState::*;
        assert!(Init.can_transition_to(Closed));
        assert!(ConnectingUpstream.can_transition_to(Closed));
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        use SessionState::*;
        assert!(!Init.can_transition_to(Relaying));
        assert!(!Relaying.can_transition_to(ConnectingUpstream));
        assert!(!Closed.can_transition_to(Init));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_session_ids_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_close_frame_propagates_peer_code() {
        let t = Termination::Closed {
            side: Side::Upstream,
            frame: Some(CloseFrame::new(1000, "bye")),
        };
        assert_eq!(t.close_frame(), Some(CloseFrame::new(1000, "bye")));
        assert_eq!(t.side(), Side::Upstream);
    }

    #[test]
    fn test_close_frame_for_failures() {
        let failed = Termination::Failed {
            side: Side::Client,
            reason: "reset".into(),
        };
        assert_eq!(failed.close_frame().map(|f| f.code), Some(1011));

        let ended = Termination::Ended {
            side: Side::Upstream,
        };
        let frame = ended.close_frame().unwrap();
        assert_eq!(frame.code, 1001);
        assert_eq!(frame.reason, "upstream disconnected");
    }

    #[test]
    fn test_reserved_peer_code_replaced() {
        let t = Termination::Closed {
            side: Side::Client,
            frame: Some(CloseFrame::new(1005, "")),
        };
        assert_eq!(t.close_frame().map(|f| f.code), Some(1000));
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Client.opposite(), Side::Upstream);
        assert_eq!(Side::Upstream.opposite(), Side::Client);
    }
}
