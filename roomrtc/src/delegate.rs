// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Engine event observers.
//!
//! Delegates are held weakly: dropping the caller's `Arc` is enough to
//! unregister. Notification snapshots the list before iterating, so a
//! delegate may add or remove delegates from inside a callback.

use crate::rtc::{DataChannelState, TransportStats};
use crate::state::ConnectionState;
use roomrtc_proto::{SignalTarget, SpeakerInfo, UserPacket};
use std::sync::{Arc, Mutex, Weak};

/// Receives engine lifecycle notifications.
///
/// All methods default to no-ops; implement the ones you care about.
/// Callbacks run on the engine's own task: keep them brief and don't
/// call back into blocking engine operations from inside one.
pub trait EngineDelegate: Send + Sync + 'static {
    /// The session state changed.
    fn on_connection_state_changed(&self, _old: &ConnectionState, _new: &ConnectionState) {}

    /// A data channel changed state.
    fn on_data_channel_state_changed(&self, _label: &str, _state: DataChannelState) {}

    /// A remote track was added on the subscriber.
    fn on_track_added(&self, _track_sid: &str, _stream_sids: &[String]) {}

    /// A remote track was removed from the subscriber.
    fn on_track_removed(&self, _track_sid: &str) {}

    /// An application payload arrived on a data channel.
    fn on_user_packet(&self, _packet: &UserPacket) {}

    /// The active speakers changed.
    fn on_speakers_changed(&self, _speakers: &[SpeakerInfo]) {}

    /// A transport delivered a stats report.
    fn on_stats(&self, _stats: &TransportStats, _target: SignalTarget) {}
}

/// A multicast list of [`EngineDelegate`]s.
pub struct Delegates {
    entries: Mutex<Vec<Weak<dyn EngineDelegate>>>,
}

impl Delegates {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a delegate. Held weakly.
    pub fn add(&self, delegate: Weak<dyn EngineDelegate>) {
        self.lock().push(delegate);
    }

    /// Unregister a delegate.
    pub fn remove(&self, delegate: &Arc<dyn EngineDelegate>) {
        // Compare data pointers only; the vtable half of a wide pointer
        // is not stable across codegen units.
        let target = Arc::as_ptr(delegate) as *const ();
        self.lock().retain(|weak| {
            !weak
                .upgrade()
                .is_some_and(|live| std::ptr::eq(Arc::as_ptr(&live) as *const (), target))
        });
    }

    /// Invoke `notify` on every live delegate. Dead entries are pruned.
    pub fn notify(&self, notify: impl Fn(&dyn EngineDelegate)) {
        let snapshot: Vec<Arc<dyn EngineDelegate>> = {
            let mut entries = self.lock();
            entries.retain(|weak| weak.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };

        for delegate in snapshot {
            notify(&*delegate);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<dyn EngineDelegate>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for Delegates {
    fn default() -> Self {
        Self::new()
    }
}
