// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Programmable transports for testing engine behavior.
//!
//! [`MockTransportFactory`] records every construction and hands out
//! [`MockTransport`]s whose connection states tests drive by hand, or
//! automatically via the `connect_*_after` knobs.

use super::{
    DataChannel, DataChannelConfig, DataChannelEvent, DataChannelState, IceCandidate,
    PeerConnectionState, RtcConfiguration, Transport, TransportEvent, TransportFactory,
};
use crate::error::EngineError;
use async_trait::async_trait;
use roomrtc_proto::{SessionDescription, SignalTarget};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One recorded call to [`TransportFactory::create_transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRecord {
    /// The signaling target.
    pub target: SignalTarget,
    /// Whether the transport was created as primary.
    pub primary: bool,
    /// Whether stats reporting was requested.
    pub report_stats: bool,
    /// The RTC configuration handed to the transport.
    pub config: RtcConfiguration,
}

#[derive(Default)]
struct FactoryState {
    records: Vec<CreateRecord>,
    transports: Vec<Arc<MockTransport>>,
    connect_primary_after: Option<Duration>,
    connect_publisher_after_offer: Option<Duration>,
    open_publisher_channels_after: Option<Duration>,
    fail_creates: u32,
}

/// A recording [`TransportFactory`] producing [`MockTransport`]s.
pub struct MockTransportFactory {
    state: Mutex<FactoryState>,
}

impl MockTransportFactory {
    /// Create a factory with no automatic behavior.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FactoryState::default()),
        }
    }

    /// Transition each created primary transport to connected `delay`
    /// after its construction.
    pub fn connect_primary_after(&self, delay: Duration) {
        lock(&self.state).connect_primary_after = Some(delay);
    }

    /// Transition the publisher to connected `delay` after it produces
    /// an offer.
    pub fn connect_publisher_after_offer(&self, delay: Duration) {
        lock(&self.state).connect_publisher_after_offer = Some(delay);
    }

    /// Open the publisher's data channels `delay` after it produces an
    /// offer.
    pub fn open_publisher_channels_after(&self, delay: Duration) {
        lock(&self.state).open_publisher_channels_after = Some(delay);
    }

    /// Fail the next `count` creations.
    pub fn fail_next_creates(&self, count: u32) {
        lock(&self.state).fail_creates = count;
    }

    /// All recorded creations, in order.
    pub fn records(&self) -> Vec<CreateRecord> {
        lock(&self.state).records.clone()
    }

    /// The most recently created transport for `target`.
    pub fn transport(&self, target: SignalTarget) -> Option<Arc<MockTransport>> {
        lock(&self.state)
            .transports
            .iter()
            .rev()
            .find(|transport| transport.target() == target)
            .cloned()
    }

    /// Every transport ever created.
    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        lock(&self.state).transports.clone()
    }
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create_transport(
        &self,
        config: RtcConfiguration,
        target: SignalTarget,
        primary: bool,
        report_stats: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn Transport>, EngineError> {
        let (connect_primary_after, connect_after_offer, open_channels_after) = {
            let mut state = lock(&self.state);
            if state.fail_creates > 0 {
                state.fail_creates -= 1;
                return Err(EngineError::WebRtc("mock transport creation failed".to_owned()));
            }
            state.records.push(CreateRecord {
                target,
                primary,
                report_stats,
                config,
            });
            (
                state.connect_primary_after,
                state.connect_publisher_after_offer,
                state.open_publisher_channels_after,
            )
        };

        let transport = Arc::new(MockTransport::new(
            target,
            primary,
            events,
            if target == SignalTarget::Publisher {
                connect_after_offer
            } else {
                None
            },
            if target == SignalTarget::Publisher {
                open_channels_after
            } else {
                None
            },
        ));

        if primary {
            if let Some(delay) = connect_primary_after {
                let transport = transport.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    transport.set_connection_state(PeerConnectionState::Connected);
                });
            }
        }

        lock(&self.state).transports.push(transport.clone());
        Ok(transport)
    }
}

struct TransportState {
    connection_state: PeerConnectionState,
    restarting_ice: bool,
    negotiate_calls: u32,
    offers: Vec<bool>,
    remote_descriptions: Vec<SessionDescription>,
    local_descriptions: Vec<SessionDescription>,
    candidates: Vec<IceCandidate>,
    channels: Vec<Arc<MockDataChannel>>,
    closed: bool,
}

/// A scriptable, recording [`Transport`].
pub struct MockTransport {
    target: SignalTarget,
    primary: bool,
    events: mpsc::UnboundedSender<TransportEvent>,
    connect_after_offer: Option<Duration>,
    open_channels_after: Option<Duration>,
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    fn new(
        target: SignalTarget,
        primary: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
        connect_after_offer: Option<Duration>,
        open_channels_after: Option<Duration>,
    ) -> Self {
        Self {
            target,
            primary,
            events,
            connect_after_offer,
            open_channels_after,
            state: Arc::new(Mutex::new(TransportState {
                connection_state: PeerConnectionState::New,
                restarting_ice: false,
                negotiate_calls: 0,
                offers: Vec::new(),
                remote_descriptions: Vec::new(),
                local_descriptions: Vec::new(),
                candidates: Vec::new(),
                channels: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Drive the connection state, emitting the event the engine sees.
    pub fn set_connection_state(&self, state: PeerConnectionState) {
        lock(&self.state).connection_state = state;
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    /// Emit an arbitrary transport event.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Transition every created data channel to open.
    pub fn open_data_channels(&self) {
        let channels = lock(&self.state).channels.clone();
        for channel in channels {
            channel.set_state(DataChannelState::Open);
        }
    }

    /// The data channel created with `label`, if any.
    pub fn channel(&self, label: &str) -> Option<Arc<MockDataChannel>> {
        lock(&self.state)
            .channels
            .iter()
            .find(|channel| channel.label() == label)
            .cloned()
    }

    /// How often `negotiate` was invoked.
    pub fn negotiate_count(&self) -> u32 {
        lock(&self.state).negotiate_calls
    }

    /// The `ice_restart` flags of every offer created, in order.
    pub fn offers(&self) -> Vec<bool> {
        lock(&self.state).offers.clone()
    }

    /// Remote descriptions applied, in order.
    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        lock(&self.state).remote_descriptions.clone()
    }

    /// Local descriptions applied, in order.
    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        lock(&self.state).local_descriptions.clone()
    }

    /// Remote candidates added, in order.
    pub fn candidates(&self) -> Vec<IceCandidate> {
        lock(&self.state).candidates.clone()
    }

    /// Whether the transport was closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn offer_created(&self, ice_restart: bool) {
        {
            let mut state = lock(&self.state);
            state.offers.push(ice_restart);
        }
        let _ = self
            .events
            .send(TransportEvent::Offer(SessionDescription::offer("mock-offer")));

        if let Some(delay) = self.connect_after_offer {
            let state = self.state.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                lock(&state).connection_state = PeerConnectionState::Connected;
                let _ = events.send(TransportEvent::StateChanged(PeerConnectionState::Connected));
            });
        }
        if let Some(delay) = self.open_channels_after {
            let state = self.state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let channels = lock(&state).channels.clone();
                for channel in channels {
                    channel.set_state(DataChannelState::Open);
                }
            });
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn target(&self) -> SignalTarget {
        self.target
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn connection_state(&self) -> PeerConnectionState {
        lock(&self.state).connection_state
    }

    fn set_restarting_ice(&self, restarting: bool) {
        lock(&self.state).restarting_ice = restarting;
    }

    fn is_restarting_ice(&self) -> bool {
        lock(&self.state).restarting_ice
    }

    fn negotiate(&self) {
        lock(&self.state).negotiate_calls += 1;
        self.offer_created(false);
    }

    async fn create_and_send_offer(&self, ice_restart: bool) -> Result<(), EngineError> {
        self.offer_created(ice_restart);
        Ok(())
    }

    async fn set_remote_description(&self, sdp: SessionDescription) -> Result<(), EngineError> {
        lock(&self.state).remote_descriptions.push(sdp);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_local_description(
        &self,
        sdp: SessionDescription,
    ) -> Result<SessionDescription, EngineError> {
        lock(&self.state).local_descriptions.push(sdp.clone());
        Ok(sdp)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        lock(&self.state).candidates.push(candidate);
        Ok(())
    }

    fn data_channel(
        &self,
        label: &str,
        config: DataChannelConfig,
    ) -> Result<Arc<dyn DataChannel>, EngineError> {
        let channel = Arc::new(MockDataChannel::new(label, config));
        lock(&self.state).channels.push(channel.clone());
        Ok(channel)
    }

    async fn close(&self) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        state.closed = true;
        state.connection_state = PeerConnectionState::Closed;
        Ok(())
    }
}

/// A recording [`DataChannel`].
pub struct MockDataChannel {
    label: String,
    config: DataChannelConfig,
    state: Mutex<DataChannelState>,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: std::sync::atomic::AtomicBool,
    events_tx: mpsc::UnboundedSender<DataChannelEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DataChannelEvent>>>,
}

impl MockDataChannel {
    /// Create a standalone channel, e.g. to hand to the engine as a
    /// remote-opened subscriber channel.
    pub fn new(label: &str, config: DataChannelConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            label: label.to_owned(),
            config,
            state: Mutex::new(DataChannelState::Connecting),
            sent: Mutex::new(Vec::new()),
            fail_sends: std::sync::atomic::AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// The configuration the channel was created with.
    pub fn config(&self) -> DataChannelConfig {
        self.config.clone()
    }

    /// Drive the channel state, emitting the event the engine sees.
    pub fn set_state(&self, state: DataChannelState) {
        *lock(&self.state) = state;
        let _ = self.events_tx.send(DataChannelEvent::StateChanged(state));
    }

    /// Deliver an inbound frame, as if the peer sent it.
    pub fn receive(&self, bytes: Vec<u8>) {
        let _ = self.events_tx.send(DataChannelEvent::Message(bytes));
    }

    /// Every frame submitted via `send`, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.sent).clone()
    }

    /// Make subsequent `send` calls report failure.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl DataChannel for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> DataChannelState {
        *lock(&self.state)
    }

    fn send(&self, data: &[u8]) -> bool {
        if self.fail_sends.load(std::sync::atomic::Ordering::SeqCst) {
            return false;
        }
        lock(&self.sent).push(data.to_vec());
        true
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DataChannelEvent>> {
        lock(&self.events_rx).take()
    }

    async fn close(&self) -> Result<(), EngineError> {
        *lock(&self.state) = DataChannelState::Closed;
        Ok(())
    }
}
