//! Session Types
//!
//! Identity of a downstream session and the lifecycle of the upstream
//! connection it owns.
//!
//! # Upstream State Machine
//!
//! ```text
//! idle ──► connecting ──► open ──► closed
//!              │                     ▲
//!              └─────────────────────┘
//! ```
//!
//! `closed → connecting` is only legal when bounded reconnect is enabled.

use std::fmt;

use uuid::Uuid;

/// Opaque identifier for one downstream client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of an upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Constructed, dial not started.
    #[default]
    Idle,
    /// Dial in progress.
    Connecting,
    /// Transport established; subscription sent or about to be.
    Open,
    /// Terminal unless reconnect is enabled.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `allow_reconnect` permits `closed → connecting`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self, allow_reconnect: bool) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting | Self::Closed)
                | (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closed)
        ) || (allow_reconnect && matches!((self, next), (Self::Closed, Self::Connecting)))
    }

    /// Whether the transport is usable.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// State name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConnectionState::Idle, ConnectionState::Connecting, true ; "idle to connecting")]
    #[test_case(ConnectionState::Idle, ConnectionState::Closed, true ; "idle to closed")]
    #[test_case(ConnectionState::Connecting, ConnectionState::Open, true ; "connecting to open")]
    #[test_case(ConnectionState::Connecting, ConnectionState::Closed, true ; "connecting to closed")]
    #[test_case(ConnectionState::Open, ConnectionState::Closed, true ; "open to closed")]
    #[test_case(ConnectionState::Open, ConnectionState::Connecting, false ; "open to connecting")]
    #[test_case(ConnectionState::Closed, ConnectionState::Connecting, false ; "no reconnect by default")]
    #[test_case(ConnectionState::Closed, ConnectionState::Open, false ; "closed to open")]
    #[test_case(ConnectionState::Idle, ConnectionState::Open, false ; "idle skips connecting")]
    fn transitions(from: ConnectionState, to: ConnectionState, legal: bool) {
        assert_eq!(from.can_transition_to(to, false), legal);
    }

    #[test]
    fn reconnect_transition_needs_opt_in() {
        assert!(ConnectionState::Closed.can_transition_to(ConnectionState::Connecting, true));
        assert!(!ConnectionState::Open.can_transition_to(ConnectionState::Connecting, true));
    }

    #[test]
    fn only_open_is_open() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Idle.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::Closed.is_open());
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Closed.as_str(), "closed");
    }
}
