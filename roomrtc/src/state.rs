// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The top-level session state machine vocabulary.
//!
//! [`ConnectionState`] has two notions of equality: the derived
//! `PartialEq` compares associated values too and is what change
//! detection (and thus delegate notification) uses, while
//! [`ConnectionState::same_kind`] ignores associated values and is what
//! gating checks ("already connected?") use. This is what makes a
//! `Connecting(Reconnect(Quick))` → `Connecting(Reconnect(Full))`
//! transition observable to delegates.

/// How a reconnect is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectMode {
    /// Resume the same session: signaling reconnect plus ICE restarts.
    Quick,
    /// Tear down all RTC state and re-run the initial connect sequence.
    Full,
}

/// How a session was (or is being) established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// A fresh connect.
    Normal,
    /// A reconnect of the given mode.
    Reconnect(ReconnectMode),
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The engine tore the session down itself, e.g. to reach a known
    /// idle state before connecting.
    Sdk,
    /// A network-level failure, optionally carrying the error text.
    Network(Option<String>),
    /// The user asked to disconnect.
    User,
    /// The server asked us to leave.
    ServerLeave,
}

/// The state of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. Initial and terminal.
    Disconnected(DisconnectReason),
    /// A session is being established.
    Connecting(ConnectionMode),
    /// The primary transport is up.
    Connected(ConnectionMode),
}

impl ConnectionState {
    /// Tag-only equality, ignoring associated values. Use this for
    /// gating checks; use `==` for change detection.
    pub fn same_kind(&self, other: &ConnectionState) -> bool {
        matches!(
            (self, other),
            (ConnectionState::Disconnected(_), ConnectionState::Disconnected(_))
                | (ConnectionState::Connecting(_), ConnectionState::Connecting(_))
                | (ConnectionState::Connected(_), ConnectionState::Connected(_))
        )
    }

    /// Whether the session is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// Whether a connect or reconnect attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting(_))
    }

    /// Whether a reconnect attempt is in progress.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting(ConnectionMode::Reconnect(_)))
    }

    /// Whether there is no session.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected(_))
    }

    /// The reconnect mode, if a reconnect is in progress or the session
    /// was established by one.
    pub fn reconnect_mode(&self) -> Option<ReconnectMode> {
        match self {
            ConnectionState::Connecting(ConnectionMode::Reconnect(mode))
            | ConnectionState::Connected(ConnectionMode::Reconnect(mode)) => Some(*mode),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_ignores_associated_values() {
        let quick = ConnectionState::Connecting(ConnectionMode::Reconnect(ReconnectMode::Quick));
        let full = ConnectionState::Connecting(ConnectionMode::Reconnect(ReconnectMode::Full));
        assert!(quick.same_kind(&full));
        assert_ne!(quick, full);

        let fresh = ConnectionState::Disconnected(DisconnectReason::Sdk);
        let dropped = ConnectionState::Disconnected(DisconnectReason::Network(None));
        assert!(fresh.same_kind(&dropped));
        assert_ne!(fresh, dropped);

        assert!(!quick.same_kind(&fresh));
    }

    #[test]
    fn predicates() {
        let quick = ConnectionState::Connecting(ConnectionMode::Reconnect(ReconnectMode::Quick));
        assert!(quick.is_connecting());
        assert!(quick.is_reconnecting());
        assert!(!quick.is_connected());
        assert_eq!(quick.reconnect_mode(), Some(ReconnectMode::Quick));

        let normal = ConnectionState::Connecting(ConnectionMode::Normal);
        assert!(normal.is_connecting());
        assert!(!normal.is_reconnecting());
        assert_eq!(normal.reconnect_mode(), None);

        let up = ConnectionState::Connected(ConnectionMode::Reconnect(ReconnectMode::Full));
        assert!(up.is_connected());
        assert!(!up.is_connecting());
        assert_eq!(up.reconnect_mode(), Some(ReconnectMode::Full));

        assert!(ConnectionState::Disconnected(DisconnectReason::User).is_disconnected());
    }
}
