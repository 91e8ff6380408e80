//! Channel connection state and the status indicator derived from it.

use std::fmt;

/// Lifecycle state of a [`RealtimeChannel`](super::RealtimeChannel).
///
/// `Connected`, `Authenticating` and `Authenticated` all mean the transport is
/// up; they differ only in how far the auth handshake has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

impl ConnectionState {
    /// Transport is open.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        )
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Auth handshake completed on the current transport.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ConnectionState::Authenticated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Authenticated => "authenticated",
        };
        f.write_str(label)
    }
}

/// What a connection-status badge should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionIndicator {
    Offline,
    Connecting,
    Live,
}

impl ConnectionIndicator {
    /// Offline without a transport, connecting until authenticated, live after.
    pub fn from_flags(is_connected: bool, is_authenticated: bool) -> Self {
        match (is_connected, is_authenticated) {
            (false, _) => ConnectionIndicator::Offline,
            (true, false) => ConnectionIndicator::Connecting,
            (true, true) => ConnectionIndicator::Live,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionIndicator::Offline => "Offline",
            ConnectionIndicator::Connecting => "Connecting...",
            ConnectionIndicator::Live => "Real-time",
        }
    }
}

impl From<ConnectionState> for ConnectionIndicator {
    fn from(state: ConnectionState) -> Self {
        Self::from_flags(state.is_connected(), state.is_authenticated())
    }
}
