// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The session engine.
//!
//! [`Engine`] coordinates a signaling channel with two peer connections
//! (a *publisher* and a *subscriber*), maintains two data channels over
//! the publisher for application data, and implements the full session
//! lifecycle: connect, steady-state message exchange, reactive
//! reconnection (quick and full) and teardown.
//!
//! # Concurrency model
//!
//! All engine state lives in a background actor task: the handle sends
//! it operations over a channel, signaling/transport/data-channel
//! events arrive on the same task, and every state transition and
//! delegate notification happens there. Long-running sequences
//! (connect, reconnect, send-readiness waits) run as spawned pipeline
//! tasks that hold only `Arc`'d collaborators and round-trip state
//! mutations through the actor, so engine fields need no locks.

mod actor;
mod pipeline;
#[cfg(test)]
mod tests;

use crate::config::{ConnectOptions, EngineConfig, RoomOptions};
use crate::connectivity::{NetworkEvent, NetworkMonitor};
use crate::delegate::{Delegates, EngineDelegate};
use crate::error::EngineError;
use crate::rtc::TransportFactory;
use crate::signal::{SignalClient, SignalEvent, ws::WsSignalClient};
use crate::state::ConnectionState;
use crate::utils::Completer;
use actor::{EngineActor, EngineMsg, EngineOp};
use roomrtc_proto::{AddTrackRequest, TrackInfo, TrackKind, TrackSource, UserPacket, data_packet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, oneshot, watch};

const LOG_TARGET: &str = "roomrtc-engine";

/// Which data channel, and which wire kind tag, a packet is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    /// Ordered delivery with unlimited retransmits.
    Reliable,
    /// Ordered delivery with no retransmits.
    Lossy,
}

impl Reliability {
    /// The label of the matching publisher data channel.
    pub fn dc_label(self) -> &'static str {
        match self {
            Reliability::Reliable => crate::rtc::RELIABLE_DC_LABEL,
            Reliability::Lossy => crate::rtc::LOSSY_DC_LABEL,
        }
    }

    pub(crate) fn wire_kind(self) -> data_packet::Kind {
        match self {
            Reliability::Reliable => data_packet::Kind::Reliable,
            Reliability::Lossy => data_packet::Kind::Lossy,
        }
    }
}

/// A point-in-time snapshot of the engine's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The connection state.
    pub state: ConnectionState,
    /// The connected URL, if a session is established.
    pub url: Option<String>,
    /// The current access token, if a session is established.
    pub token: Option<String>,
    /// Whether the server designated the subscriber as primary.
    pub subscriber_primary: bool,
    /// Whether the publisher has ever been asked to negotiate.
    pub has_published: bool,
}

/// The four readiness completers the engine rendezvouses on.
pub(crate) struct Completers {
    pub primary_transport_connected: Completer<()>,
    pub publisher_transport_connected: Completer<()>,
    pub publisher_reliable_dc_open: Completer<()>,
    pub publisher_lossy_dc_open: Completer<()>,
}

impl Completers {
    fn new() -> Self {
        Self {
            primary_transport_connected: Completer::new(),
            publisher_transport_connected: Completer::new(),
            publisher_reliable_dc_open: Completer::new(),
            publisher_lossy_dc_open: Completer::new(),
        }
    }

    pub fn for_reliability(&self, reliability: Reliability) -> &Completer<()> {
        match reliability {
            Reliability::Reliable => &self.publisher_reliable_dc_open,
            Reliability::Lossy => &self.publisher_lossy_dc_open,
        }
    }

    /// Cancel all pending waiters and rearm.
    pub fn reset_all(&self) {
        self.primary_transport_connected.reset();
        self.publisher_transport_connected.reset();
        self.publisher_reliable_dc_open.reset();
        self.publisher_lossy_dc_open.reset();
    }

    /// Clear stored values without disturbing waiters.
    pub fn clear_values(&self) {
        self.primary_transport_connected.set(None);
        self.publisher_transport_connected.set(None);
        self.publisher_reliable_dc_open.set(None);
        self.publisher_lossy_dc_open.set(None);
    }
}

/// State shared between the handle, the actor and pipeline tasks.
pub(crate) struct EngineShared {
    pub signal: Arc<dyn SignalClient>,
    pub factory: Arc<dyn TransportFactory>,
    pub delegates: Delegates,
    pub completers: Completers,
    /// Written only by the actor; everyone else takes read snapshots.
    pub config: Mutex<EngineConfig>,
    pub state: watch::Receiver<ConnectionState>,
    pub to_actor: mpsc::UnboundedSender<EngineMsg>,
}

impl EngineShared {
    pub fn config(&self) -> MutexGuard<'_, EngineConfig> {
        match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    transport_factory: Arc<dyn TransportFactory>,
    signal_client: Option<Arc<dyn SignalClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    connect_options: ConnectOptions,
    room_options: RoomOptions,
}

impl EngineBuilder {
    /// Use a specific signal client instead of the default WebSocket
    /// one.
    pub fn signal_client(mut self, client: Arc<dyn SignalClient>) -> Self {
        self.signal_client = Some(client);
        self
    }

    /// Attach an OS network-path monitor; path changes while connected
    /// trigger a reconnect.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Default connect options, overridable per `connect` call.
    pub fn connect_options(mut self, options: ConnectOptions) -> Self {
        self.connect_options = options;
        self
    }

    /// Default room options, overridable per `connect` call.
    pub fn room_options(mut self, options: RoomOptions) -> Self {
        self.room_options = options;
        self
    }

    /// Build the engine and spawn its background task. Must be called
    /// within a tokio runtime.
    pub fn build(self) -> Engine {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) =
            watch::channel(ConnectionState::Disconnected(crate::state::DisconnectReason::Sdk));

        let signal = self
            .signal_client
            .unwrap_or_else(|| Arc::new(WsSignalClient::new()) as Arc<dyn SignalClient>);

        let shared = Arc::new(EngineShared {
            signal: signal.clone(),
            factory: self.transport_factory,
            delegates: Delegates::new(),
            completers: Completers::new(),
            config: Mutex::new(EngineConfig {
                connect: self.connect_options,
                room: self.room_options,
            }),
            state: state_rx,
            to_actor: msg_tx.clone(),
        });

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalEvent>();
        signal.attach_listener(signal_tx);
        {
            let msg_tx = msg_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = signal_rx.recv().await {
                    if msg_tx.send(EngineMsg::Signal(event)).is_err() {
                        break;
                    }
                }
            });
        }

        if let Some(monitor) = self.network_monitor {
            let (net_tx, mut net_rx) = mpsc::unbounded_channel::<NetworkEvent>();
            monitor.attach_listener(net_tx);
            let msg_tx = msg_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = net_rx.recv().await {
                    if msg_tx.send(EngineMsg::Network(event)).is_err() {
                        break;
                    }
                }
            });
        }

        tokio::spawn(EngineActor::new(shared.clone(), ops_rx, msg_rx, state_tx).run());

        Engine {
            ops: ops_tx,
            shared,
        }
    }
}

/// The session engine handle.
///
/// Cheap to clone; the session itself lives in a background task which
/// shuts down (tearing the session down) once every handle is dropped.
#[derive(Clone)]
pub struct Engine {
    ops: mpsc::UnboundedSender<EngineOp>,
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Start building an engine around a transport factory.
    pub fn builder(transport_factory: Arc<dyn TransportFactory>) -> EngineBuilder {
        EngineBuilder {
            transport_factory,
            signal_client: None,
            network_monitor: None,
            connect_options: ConnectOptions::default(),
            room_options: RoomOptions::default(),
        }
    }

    /// Build an engine with default options around a transport factory.
    pub fn new(transport_factory: Arc<dyn TransportFactory>) -> Engine {
        Engine::builder(transport_factory).build()
    }

    /// Establish a session.
    ///
    /// The engine may be invoked on a live session: it first tears the
    /// old one down to reach a known idle state. Resolves once the
    /// primary transport is connected; on failure the engine is left
    /// disconnected and the error is returned.
    pub async fn connect(&self, url: &str, token: &str) -> Result<(), EngineError> {
        self.connect_with(url, token, None, None).await
    }

    /// [`Engine::connect`] with per-call option overrides.
    pub async fn connect_with(
        &self,
        url: &str,
        token: &str,
        connect_options: Option<ConnectOptions>,
        room_options: Option<RoomOptions>,
    ) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_op(EngineOp::Connect {
            url: url.to_owned(),
            token: token.to_owned(),
            connect_options,
            room_options,
            reply,
        })?;
        rx.await.map_err(|_| engine_terminated())?
    }

    /// Publish an application payload on the matching publisher data
    /// channel.
    ///
    /// Suspends until the publisher transport is connected and the
    /// channel is open (negotiating lazily if needed). Concurrent sends
    /// are permitted and are not serialized against each other.
    pub async fn send(&self, packet: UserPacket, reliability: Reliability) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_op(EngineOp::Send {
            packet,
            reliability,
            reply,
        })?;
        rx.await.map_err(|_| engine_terminated())?
    }

    /// Ask the server to publish a track and wait for its response.
    ///
    /// `populate` receives the prepared request for final adjustment;
    /// its return value is handed back alongside the server's track
    /// info.
    pub async fn add_track<F, R>(
        &self,
        cid: &str,
        name: &str,
        kind: TrackKind,
        source: TrackSource,
        populate: F,
    ) -> Result<(R, TrackInfo), EngineError>
    where
        F: FnOnce(&mut AddTrackRequest) -> R,
    {
        let completer = self.shared.signal.prepare_track_completer(cid);
        let publish_timeout = self.shared.config().connect.timeouts.publish;

        let mut request = AddTrackRequest {
            cid: cid.to_owned(),
            name: name.to_owned(),
            kind: kind as i32,
            source: source as i32,
            muted: false,
        };
        let result = populate(&mut request);

        self.shared.signal.send_add_track(request).await?;

        let info = completer
            .wait(publish_timeout, || {
                EngineError::EngineTimedOut("server didn't respond to addTrack request".to_owned())
            })
            .await?;

        Ok((result, info))
    }

    /// Tear the session down on behalf of the user. Also aborts any
    /// in-flight reconnect.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send_op(EngineOp::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Mark the publisher as published and kick off its negotiation.
    /// No-op while no publisher transport exists.
    pub fn publisher_should_negotiate(&self) {
        let _ = self.ops.send(EngineOp::PublisherShouldNegotiate);
    }

    /// The current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// A point-in-time snapshot of the session.
    pub async fn session_info(&self) -> Result<SessionInfo, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_op(EngineOp::Info { reply })?;
        rx.await.map_err(|_| engine_terminated())
    }

    /// Register a delegate. Held weakly: dropping the `Arc` is enough
    /// to unregister.
    pub fn add_delegate<D: EngineDelegate>(&self, delegate: &Arc<D>) {
        let delegate: Arc<dyn EngineDelegate> = delegate.clone();
        let weak: Weak<dyn EngineDelegate> = Arc::downgrade(&delegate);
        self.shared.delegates.add(weak);
    }

    /// Unregister a delegate.
    pub fn remove_delegate(&self, delegate: &Arc<dyn EngineDelegate>) {
        self.shared.delegates.remove(delegate);
    }

    fn send_op(&self, op: EngineOp) -> Result<(), EngineError> {
        self.ops.send(op).map_err(|_| engine_terminated())
    }
}

fn engine_terminated() -> EngineError {
    EngineError::Cancelled("engine terminated".to_owned())
}
