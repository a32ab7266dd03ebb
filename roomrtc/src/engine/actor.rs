// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The background task that owns all session state.
//!
//! Everything mutable about a session (transports, data channels,
//! identity, flags) lives in [`Session`], which only
//! [`EngineActor::run`] ever touches. Pipelines ask for
//! mutations through [`EngineMsg`]; transport and data-channel events
//! are tagged with a session generation so frames from a torn-down
//! session are dropped instead of corrupting the next one.

use super::{EngineShared, Reliability, SessionInfo, pipeline};
use crate::config::{ConnectOptions, RoomOptions};
use crate::connectivity::NetworkEvent;
use crate::error::EngineError;
use crate::rtc::{
    DataChannel, DataChannelConfig, DataChannelEvent, DataChannelState, LOSSY_DC_LABEL,
    PeerConnectionState, RELIABLE_DC_LABEL, RtcConfiguration, Transport, TransportEvent,
};
use crate::signal::{SignalConnectionState, SignalEvent};
use crate::state::{ConnectionMode, ConnectionState, DisconnectReason, ReconnectMode};
use crate::utils::Stopwatch;
use roomrtc_proto::{DataPacket, JoinResponse, Message as _, SignalTarget, data_packet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

const LOG_TARGET: &str = "roomrtc-engine";

/// Operations submitted by [`super::Engine`] handles.
pub(crate) enum EngineOp {
    Connect {
        url: String,
        token: String,
        connect_options: Option<ConnectOptions>,
        room_options: Option<RoomOptions>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Send {
        packet: roomrtc_proto::UserPacket,
        reliability: Reliability,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    PublisherShouldNegotiate,
    Info {
        reply: oneshot::Sender<SessionInfo>,
    },
}

/// Messages from pipelines, event forwarders and collaborators.
///
/// Messages that mutate session state carry the generation their
/// pipeline was spawned for; the actor ignores them once the session
/// has been torn down or replaced.
pub(crate) enum EngineMsg {
    ConfigureTransports {
        generation: u64,
        join: Box<JoinResponse>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    CleanUp {
        generation: Option<u64>,
        reason: DisconnectReason,
        reply: oneshot::Sender<()>,
    },
    CleanUpRtc {
        generation: u64,
        reply: oneshot::Sender<Result<u64, EngineError>>,
    },
    SessionEstablished {
        generation: u64,
        url: String,
        token: String,
        mode: ConnectionMode,
        reply: oneshot::Sender<()>,
    },
    DegradeToFullReconnect {
        generation: u64,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    PublisherDataChannel {
        reliability: Reliability,
        reply: oneshot::Sender<Option<Arc<dyn DataChannel>>>,
    },
    StopwatchSplit {
        name: &'static str,
    },
    Signal(SignalEvent),
    Transport {
        generation: u64,
        target: SignalTarget,
        event: TransportEvent,
    },
    DataChannel {
        generation: u64,
        origin: SignalTarget,
        label: String,
        event: DataChannelEvent,
    },
    Network(NetworkEvent),
}

/// All mutable session state. Owned exclusively by the actor.
struct Session {
    url: Option<String>,
    token: Option<String>,
    subscriber_primary: bool,
    publisher: Option<Arc<dyn Transport>>,
    subscriber: Option<Arc<dyn Transport>>,
    dc_reliable_pub: Option<Arc<dyn DataChannel>>,
    dc_lossy_pub: Option<Arc<dyn DataChannel>>,
    dc_reliable_sub: Option<Arc<dyn DataChannel>>,
    dc_lossy_sub: Option<Arc<dyn DataChannel>>,
    has_published: bool,
    generation: u64,
    stopwatch: Stopwatch,
}

impl Session {
    fn new() -> Self {
        Self {
            url: None,
            token: None,
            subscriber_primary: false,
            publisher: None,
            subscriber: None,
            dc_reliable_pub: None,
            dc_lossy_pub: None,
            dc_reliable_sub: None,
            dc_lossy_sub: None,
            has_published: false,
            generation: 0,
            stopwatch: Stopwatch::new("connect"),
        }
    }

    fn transport(&self, target: SignalTarget) -> Option<Arc<dyn Transport>> {
        match target {
            SignalTarget::Publisher => self.publisher.clone(),
            SignalTarget::Subscriber => self.subscriber.clone(),
        }
    }

    /// Whether `target` is the transport whose connected state defines
    /// session liveness.
    fn is_primary(&self, target: SignalTarget) -> bool {
        (target == SignalTarget::Subscriber) == self.subscriber_primary
    }
}

pub(crate) struct EngineActor {
    session: Session,
    shared: Arc<EngineShared>,
    ops: mpsc::UnboundedReceiver<EngineOp>,
    msgs: mpsc::UnboundedReceiver<EngineMsg>,
    state_tx: watch::Sender<ConnectionState>,
}

impl EngineActor {
    pub fn new(
        shared: Arc<EngineShared>,
        ops: mpsc::UnboundedReceiver<EngineOp>,
        msgs: mpsc::UnboundedReceiver<EngineMsg>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            session: Session::new(),
            shared,
            ops,
            msgs,
            state_tx,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                op = self.ops.recv() => match op {
                    Some(op) => self.handle_op(op).await,
                    // Every handle is gone; tear down and stop.
                    None => break,
                },
                msg = self.msgs.recv() => match msg {
                    Some(msg) => self.handle_msg(msg).await,
                    None => break,
                },
            }
        }

        self.clean_up(DisconnectReason::Sdk).await;
        tracing::debug!(target: LOG_TARGET, "engine task finished");
    }

    fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    async fn handle_op(&mut self, op: EngineOp) {
        match op {
            EngineOp::Connect {
                url,
                token,
                connect_options,
                room_options,
                reply,
            } => {
                {
                    let mut config = self.shared.config();
                    if let Some(connect) = connect_options {
                        config.connect = connect;
                    }
                    if let Some(room) = room_options {
                        config.room = room;
                    }
                }

                // Reach a known idle state first; the engine may be
                // invoked on a live session.
                self.clean_up(DisconnectReason::Sdk).await;
                self.transition(ConnectionState::Connecting(ConnectionMode::Normal));
                self.session.stopwatch.clear();

                pipeline::spawn_connect(
                    self.shared.clone(),
                    self.session.generation,
                    url,
                    token,
                    reply,
                );
            }
            EngineOp::Send {
                packet,
                reliability,
                reply,
            } => {
                // When the publisher is primary it is connected by the
                // time the session is up; nothing to wait on.
                let need_publisher_wait = self.session.subscriber_primary;
                if need_publisher_wait {
                    if let Some(publisher) = &self.session.publisher {
                        let state = publisher.connection_state();
                        if !matches!(
                            state,
                            PeerConnectionState::Connected | PeerConnectionState::Connecting
                        ) {
                            self.publisher_should_negotiate();
                        }
                    }
                }

                pipeline::spawn_send(
                    self.shared.clone(),
                    need_publisher_wait,
                    packet,
                    reliability,
                    reply,
                );
            }
            EngineOp::Close { reply } => {
                self.clean_up(DisconnectReason::User).await;
                let _ = reply.send(());
            }
            EngineOp::PublisherShouldNegotiate => self.publisher_should_negotiate(),
            EngineOp::Info { reply } => {
                let _ = reply.send(SessionInfo {
                    state: self.state(),
                    url: self.session.url.clone(),
                    token: self.session.token.clone(),
                    subscriber_primary: self.session.subscriber_primary,
                    has_published: self.session.has_published,
                });
            }
        }
    }

    async fn handle_msg(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::ConfigureTransports {
                generation,
                join,
                reply,
            } => {
                let result = if generation == self.session.generation {
                    self.configure_transports(*join).await
                } else {
                    Err(stale_pipeline())
                };
                let _ = reply.send(result);
            }
            EngineMsg::CleanUp {
                generation,
                reason,
                reply,
            } => {
                match generation {
                    Some(generation) if generation != self.session.generation => {
                        tracing::debug!(target: LOG_TARGET, "ignoring stale clean up request");
                    }
                    _ => self.clean_up(reason).await,
                }
                let _ = reply.send(());
            }
            EngineMsg::CleanUpRtc { generation, reply } => {
                let result = if generation == self.session.generation {
                    self.clean_up_rtc().await;
                    Ok(self.session.generation)
                } else {
                    Err(stale_pipeline())
                };
                let _ = reply.send(result);
            }
            EngineMsg::SessionEstablished {
                generation,
                url,
                token,
                mode,
                reply,
            } => {
                if generation == self.session.generation && self.state().is_connecting() {
                    self.session.url = Some(url);
                    self.session.token = Some(token);
                    self.transition(ConnectionState::Connected(mode));
                    if !self.session.stopwatch.is_empty() {
                        tracing::info!(target: LOG_TARGET, "{}", self.session.stopwatch);
                    }
                } else {
                    tracing::debug!(target: LOG_TARGET, "ignoring stale session result");
                }
                let _ = reply.send(());
            }
            EngineMsg::DegradeToFullReconnect { generation, reply } => {
                let result = if generation == self.session.generation
                    && self.state().is_reconnecting()
                {
                    self.transition(ConnectionState::Connecting(ConnectionMode::Reconnect(
                        ReconnectMode::Full,
                    )));
                    Ok(())
                } else {
                    Err(stale_pipeline())
                };
                let _ = reply.send(result);
            }
            EngineMsg::PublisherDataChannel { reliability, reply } => {
                let dc = match reliability {
                    Reliability::Reliable => self.session.dc_reliable_pub.clone(),
                    Reliability::Lossy => self.session.dc_lossy_pub.clone(),
                };
                let _ = reply.send(dc);
            }
            EngineMsg::StopwatchSplit { name } => self.session.stopwatch.split(name),
            EngineMsg::Signal(event) => self.handle_signal_event(event).await,
            EngineMsg::Transport {
                generation,
                target,
                event,
            } => {
                if generation == self.session.generation {
                    self.handle_transport_event(target, event);
                }
            }
            EngineMsg::DataChannel {
                generation,
                origin,
                label,
                event,
            } => {
                if generation == self.session.generation {
                    self.handle_data_channel_event(origin, &label, event);
                }
            }
            EngineMsg::Network(NetworkEvent::PathDidChange) => {
                tracing::debug!(target: LOG_TARGET, "network path changed");
                if let Err(error) = self.start_reconnect() {
                    tracing::debug!(target: LOG_TARGET, %error, "not reconnecting on path change");
                }
            }
        }
    }

    /// Apply a state transition and notify delegates, exactly once per
    /// observable change.
    fn transition(&mut self, new: ConnectionState) {
        let old = self.state();
        if old == new {
            return;
        }

        tracing::info!(target: LOG_TARGET, ?old, ?new, "connection state changed");
        self.state_tx.send_replace(new.clone());
        self.shared
            .delegates
            .notify(|delegate| delegate.on_connection_state_changed(&old, &new));
    }

    fn publisher_should_negotiate(&mut self) {
        let Some(publisher) = &self.session.publisher else {
            tracing::debug!(target: LOG_TARGET, "no publisher to negotiate");
            return;
        };
        self.session.has_published = true;
        publisher.negotiate();
    }

    /// Create both transports and the publisher data channels from a
    /// join response. Idempotent: a no-op when both transports exist.
    async fn configure_transports(&mut self, join: JoinResponse) -> Result<(), EngineError> {
        if self.session.publisher.is_some() && self.session.subscriber.is_some() {
            tracing::debug!(target: LOG_TARGET, "transports already configured");
            return Ok(());
        }

        tracing::debug!(
            target: LOG_TARGET,
            subscriber_primary = join.subscriber_primary,
            "configuring transports",
        );
        self.session.subscriber_primary = join.subscriber_primary;

        let (rtc_config, report_stats) = {
            let config = self.shared.config();
            let mut rtc = config.connect.rtc.clone();
            // The server's ICE servers apply unless the caller pinned
            // their own list.
            if rtc.ice_servers.is_empty() {
                rtc.ice_servers = join.ice_servers.clone();
            }
            (rtc, config.room.report_stats)
        };

        let generation = self.session.generation;

        let subscriber = self
            .create_transport(
                rtc_config.clone(),
                SignalTarget::Subscriber,
                join.subscriber_primary,
                report_stats,
                generation,
            )
            .await?;
        self.session.subscriber = Some(subscriber);

        let publisher = self
            .create_transport(
                rtc_config,
                SignalTarget::Publisher,
                !join.subscriber_primary,
                report_stats,
                generation,
            )
            .await?;

        let reliable = publisher.data_channel(
            RELIABLE_DC_LABEL,
            DataChannelConfig {
                ordered: true,
                max_retransmits: None,
            },
        )?;
        self.watch_data_channel(&reliable, SignalTarget::Publisher, generation);
        self.session.dc_reliable_pub = Some(reliable);

        let lossy = publisher.data_channel(
            LOSSY_DC_LABEL,
            DataChannelConfig {
                ordered: true,
                max_retransmits: Some(0),
            },
        )?;
        self.watch_data_channel(&lossy, SignalTarget::Publisher, generation);
        self.session.dc_lossy_pub = Some(lossy);

        self.session.publisher = Some(publisher);

        // With a primary publisher the first offer can't wait for a
        // track to be added.
        if !join.subscriber_primary {
            self.publisher_should_negotiate();
        }

        Ok(())
    }

    async fn create_transport(
        &self,
        config: RtcConfiguration,
        target: SignalTarget,
        primary: bool,
        report_stats: bool,
        generation: u64,
    ) -> Result<Arc<dyn Transport>, EngineError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let to_actor = self.shared.to_actor.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let msg = EngineMsg::Transport {
                    generation,
                    target,
                    event,
                };
                if to_actor.send(msg).is_err() {
                    break;
                }
            }
        });

        self.shared
            .factory
            .create_transport(config, target, primary, report_stats, events_tx)
            .await
    }

    fn watch_data_channel(
        &self,
        dc: &Arc<dyn DataChannel>,
        origin: SignalTarget,
        generation: u64,
    ) {
        let Some(mut events_rx) = dc.take_events() else {
            tracing::warn!(
                target: LOG_TARGET,
                label = dc.label(),
                "data channel events already taken",
            );
            return;
        };

        let label = dc.label().to_owned();
        let to_actor = self.shared.to_actor.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let msg = EngineMsg::DataChannel {
                    generation,
                    origin,
                    label: label.clone(),
                    event,
                };
                if to_actor.send(msg).is_err() {
                    break;
                }
            }
        });
    }

    /// Unconditional teardown to a disconnected state.
    async fn clean_up(&mut self, reason: DisconnectReason) {
        tracing::debug!(target: LOG_TARGET, ?reason, "cleaning up");

        self.session.url = None;
        self.session.token = None;
        self.transition(ConnectionState::Disconnected(reason.clone()));

        self.shared.signal.clean_up(reason).await;
        self.shared.completers.reset_all();
        self.session.stopwatch.clear();

        self.clean_up_rtc().await;
    }

    /// Close and drop all RTC objects. Close failures are logged and
    /// otherwise ignored; teardown proceeds regardless.
    async fn clean_up_rtc(&mut self) {
        // Events still in flight from the old transports must not touch
        // the next session.
        self.session.generation += 1;

        let channels = [
            self.session.dc_reliable_pub.take(),
            self.session.dc_lossy_pub.take(),
            self.session.dc_reliable_sub.take(),
            self.session.dc_lossy_sub.take(),
        ];
        for dc in channels.into_iter().flatten() {
            if let Err(error) = dc.close().await {
                tracing::warn!(target: LOG_TARGET, label = dc.label(), %error, "failed to close data channel");
            }
        }

        if let Some(publisher) = self.session.publisher.take() {
            if let Err(error) = publisher.close().await {
                tracing::warn!(target: LOG_TARGET, %error, "failed to close publisher");
            }
        }
        if let Some(subscriber) = self.session.subscriber.take() {
            if let Err(error) = subscriber.close().await {
                tracing::warn!(target: LOG_TARGET, %error, "failed to close subscriber");
            }
        }

        self.session.has_published = false;
        self.shared.completers.clear_values();
    }

    /// Begin the reconnect protocol: up to three quick attempts, then
    /// one full attempt, then teardown.
    fn start_reconnect(&mut self) -> Result<(), EngineError> {
        let state = self.state();
        if state.is_reconnecting() {
            return Err(EngineError::state("Already reconnecting"));
        }
        if !state.is_connected() {
            return Err(EngineError::state("Must be called with connected state"));
        }
        let (Some(url), Some(token)) = (self.session.url.clone(), self.session.token.clone())
        else {
            return Err(EngineError::state("url or token is nil"));
        };
        let (Some(publisher), Some(subscriber)) = (
            self.session.publisher.clone(),
            self.session.subscriber.clone(),
        ) else {
            return Err(EngineError::state("publisher or subscriber is nil"));
        };

        tracing::warn!(target: LOG_TARGET, "connection lost, reconnecting");
        self.transition(ConnectionState::Connecting(ConnectionMode::Reconnect(
            ReconnectMode::Quick,
        )));

        pipeline::spawn_reconnect(
            self.shared.clone(),
            pipeline::ReconnectContext {
                generation: self.session.generation,
                url,
                token,
                publisher,
                subscriber,
                has_published: self.session.has_published,
            },
        );

        Ok(())
    }

    async fn handle_signal_event(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::ConnectionState(state) => {
                tracing::debug!(target: LOG_TARGET, ?state, "signal connection state changed");
                if let SignalConnectionState::Disconnected(DisconnectReason::Network(_)) = state {
                    if let Err(error) = self.start_reconnect() {
                        tracing::debug!(target: LOG_TARGET, %error, "not reconnecting on signal loss");
                    }
                }
            }
            SignalEvent::Offer(sdp) => {
                let Some(subscriber) = self.session.subscriber.clone() else {
                    tracing::error!(target: LOG_TARGET, "received offer but subscriber is nil");
                    return;
                };
                let signal = self.shared.signal.clone();
                tokio::spawn(async move {
                    let answer = async {
                        subscriber.set_remote_description(sdp).await?;
                        let answer = subscriber.create_answer().await?;
                        let answer = subscriber.set_local_description(answer).await?;
                        signal.send_answer(answer).await
                    }
                    .await;
                    if let Err(error) = answer {
                        tracing::error!(target: LOG_TARGET, %error, "failed to answer offer");
                    }
                });
            }
            SignalEvent::Answer(sdp) => {
                let Some(publisher) = self.session.publisher.clone() else {
                    tracing::debug!(target: LOG_TARGET, "received answer but publisher is nil");
                    return;
                };
                tokio::spawn(async move {
                    if let Err(error) = publisher.set_remote_description(sdp).await {
                        tracing::error!(target: LOG_TARGET, %error, "failed to apply answer");
                    }
                });
            }
            SignalEvent::Trickle { candidate, target } => {
                let Some(transport) = self.session.transport(target) else {
                    tracing::warn!(target: LOG_TARGET, signal_target = ?target, "ice candidate for missing transport");
                    return;
                };
                tokio::spawn(async move {
                    if let Err(error) = transport.add_ice_candidate(candidate).await {
                        tracing::warn!(target: LOG_TARGET, %error, "failed to add ice candidate");
                    }
                });
            }
            SignalEvent::Leave { can_reconnect } => {
                tracing::warn!(target: LOG_TARGET, can_reconnect, "server asked us to leave");
                if !can_reconnect {
                    self.clean_up(DisconnectReason::Network(None)).await;
                }
                // Otherwise the signaling socket drop that follows
                // drives the reconnect through the state callback.
            }
            SignalEvent::RefreshToken(token) => {
                if self.session.token.is_some() {
                    self.session.token = Some(token);
                } else {
                    tracing::debug!(target: LOG_TARGET, "ignoring token refresh with no session");
                }
            }
        }
    }

    fn handle_transport_event(&mut self, target: SignalTarget, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                let is_primary = self.session.is_primary(target);
                tracing::debug!(target: LOG_TARGET, signal_target = ?target, ?state, is_primary, "transport state changed");

                if is_primary {
                    self.shared
                        .completers
                        .primary_transport_connected
                        .set(state.is_connected().then_some(()));
                }
                if target == SignalTarget::Publisher {
                    self.shared
                        .completers
                        .publisher_transport_connected
                        .set(state.is_connected().then_some(()));
                }

                let lost = matches!(
                    state,
                    PeerConnectionState::Disconnected | PeerConnectionState::Failed
                );
                let relevant = is_primary
                    || (target == SignalTarget::Publisher && self.session.has_published);
                if self.state().is_connected() && lost && relevant {
                    if let Err(error) = self.start_reconnect() {
                        tracing::debug!(target: LOG_TARGET, %error, "not reconnecting on transport loss");
                    }
                }
            }
            TransportEvent::IceCandidate(candidate) => {
                let signal = self.shared.signal.clone();
                tokio::spawn(async move {
                    if let Err(error) = signal.send_candidate(candidate, target).await {
                        tracing::warn!(target: LOG_TARGET, %error, "failed to send ice candidate");
                    }
                });
            }
            TransportEvent::Offer(offer) => {
                if target != SignalTarget::Publisher {
                    tracing::debug!(target: LOG_TARGET, "ignoring offer from subscriber transport");
                    return;
                }
                let signal = self.shared.signal.clone();
                tokio::spawn(async move {
                    if let Err(error) = signal.send_offer(offer).await {
                        tracing::error!(target: LOG_TARGET, %error, "failed to send offer");
                    }
                });
            }
            TransportEvent::TrackAdded {
                track_sid,
                stream_sids,
            } => {
                if target != SignalTarget::Subscriber {
                    return;
                }
                self.shared
                    .delegates
                    .notify(|delegate| delegate.on_track_added(&track_sid, &stream_sids));
            }
            TransportEvent::TrackRemoved { track_sid } => {
                if target != SignalTarget::Subscriber {
                    return;
                }
                self.shared
                    .delegates
                    .notify(|delegate| delegate.on_track_removed(&track_sid));
            }
            TransportEvent::DataChannelOpened(dc) => {
                if target != SignalTarget::Subscriber || !self.session.subscriber_primary {
                    tracing::debug!(target: LOG_TARGET, label = dc.label(), "ignoring unexpected remote data channel");
                    return;
                }
                match dc.label() {
                    RELIABLE_DC_LABEL => {
                        self.watch_data_channel(&dc, SignalTarget::Subscriber, self.session.generation);
                        self.session.dc_reliable_sub = Some(dc);
                    }
                    LOSSY_DC_LABEL => {
                        self.watch_data_channel(&dc, SignalTarget::Subscriber, self.session.generation);
                        self.session.dc_lossy_sub = Some(dc);
                    }
                    label => {
                        tracing::warn!(target: LOG_TARGET, label, "unknown remote data channel label");
                    }
                }
            }
            TransportEvent::Stats(stats) => {
                self.shared
                    .delegates
                    .notify(|delegate| delegate.on_stats(&stats, target));
            }
        }
    }

    fn handle_data_channel_event(
        &mut self,
        origin: SignalTarget,
        label: &str,
        event: DataChannelEvent,
    ) {
        match event {
            DataChannelEvent::StateChanged(state) => {
                tracing::debug!(target: LOG_TARGET, label, ?state, "data channel state changed");
                self.shared
                    .delegates
                    .notify(|delegate| delegate.on_data_channel_state_changed(label, state));

                if origin == SignalTarget::Publisher {
                    let open = (state == DataChannelState::Open).then_some(());
                    match label {
                        RELIABLE_DC_LABEL => {
                            self.shared.completers.publisher_reliable_dc_open.set(open);
                        }
                        LOSSY_DC_LABEL => {
                            self.shared.completers.publisher_lossy_dc_open.set(open);
                        }
                        _ => {}
                    }
                }
            }
            DataChannelEvent::Message(bytes) => {
                let packet = match DataPacket::decode(&bytes[..]) {
                    Ok(packet) => packet,
                    Err(error) => {
                        tracing::warn!(target: LOG_TARGET, %error, "failed to decode data packet");
                        return;
                    }
                };

                match packet.value {
                    Some(data_packet::Value::Speaker(update)) => {
                        self.shared
                            .delegates
                            .notify(|delegate| delegate.on_speakers_changed(&update.speakers));
                    }
                    Some(data_packet::Value::User(user)) => {
                        self.shared
                            .delegates
                            .notify(|delegate| delegate.on_user_packet(&user));
                    }
                    // Unknown variants are newer than us; skip them.
                    None => {}
                }
            }
        }
    }
}

fn stale_pipeline() -> EngineError {
    EngineError::Cancelled("session was torn down".to_owned())
}
