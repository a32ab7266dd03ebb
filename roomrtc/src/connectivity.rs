// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! OS network-path change events.
//!
//! Mobile clients switch paths (cellular to wifi and back) without the sockets
//! noticing promptly; a path change while connected is treated as a
//! reconnect trigger. Platform integrations implement
//! [`NetworkMonitor`] over whatever the OS offers; the engine only
//! consumes the events.

use tokio::sync::mpsc;

/// A network-path event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The active network path changed.
    PathDidChange,
}

/// Emits OS network-path events to an attached listener.
pub trait NetworkMonitor: Send + Sync + 'static {
    /// Attach the listener that receives [`NetworkEvent`]s. Called
    /// once, when the engine is built.
    fn attach_listener(&self, events: mpsc::UnboundedSender<NetworkEvent>);
}

/// A programmable monitor for tests.
#[cfg(any(test, feature = "mock-client"))]
pub struct MockNetworkMonitor {
    listener: std::sync::Mutex<Option<mpsc::UnboundedSender<NetworkEvent>>>,
}

#[cfg(any(test, feature = "mock-client"))]
impl MockNetworkMonitor {
    /// Create a monitor with no listener attached yet.
    pub fn new() -> Self {
        Self {
            listener: std::sync::Mutex::new(None),
        }
    }

    /// Emit a path change to the attached listener.
    pub fn trigger_path_change(&self) {
        if let Ok(guard) = self.listener.lock() {
            if let Some(listener) = guard.as_ref() {
                let _ = listener.send(NetworkEvent::PathDidChange);
            }
        }
    }
}

#[cfg(any(test, feature = "mock-client"))]
impl Default for MockNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock-client"))]
impl NetworkMonitor for MockNetworkMonitor {
    fn attach_listener(&self, events: mpsc::UnboundedSender<NetworkEvent>) {
        if let Ok(mut guard) = self.listener.lock() {
            *guard = Some(events);
        }
    }
}
