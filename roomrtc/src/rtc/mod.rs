// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The peer-connection interfaces the engine drives.
//!
//! The engine never talks to a native WebRTC library directly: it
//! consumes the [`Transport`], [`DataChannel`] and [`TransportFactory`]
//! traits here. A production implementation wraps one peer connection
//! per [`Transport`]; the mocks in [`mock`] are enough for everything
//! the engine itself needs testing against.

use crate::error::EngineError;
use async_trait::async_trait;
use roomrtc_proto::{IceServer, SessionDescription, SignalTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[cfg(any(test, feature = "mock-client"))]
pub mod mock;

/// Label of the reliable publisher data channel. Wire-compatible: the
/// exact bytes matter to the peer.
pub const RELIABLE_DC_LABEL: &str = "_reliable";

/// Label of the lossy publisher data channel. Wire-compatible.
pub const LOSSY_DC_LABEL: &str = "_lossy";

/// The state of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    /// Freshly constructed.
    New,
    /// Negotiation or ICE is in progress.
    Connecting,
    /// Media can flow.
    Connected,
    /// Connectivity was lost; may recover on its own.
    Disconnected,
    /// Connectivity was lost and won't recover without an ICE restart.
    Failed,
    /// The connection was closed.
    Closed,
}

impl PeerConnectionState {
    /// Whether the connection is up.
    pub fn is_connected(self) -> bool {
        matches!(self, PeerConnectionState::Connected)
    }

    /// Whether the connection is being established. A freshly
    /// constructed connection is not connecting until negotiation
    /// begins.
    pub fn is_connecting(self) -> bool {
        matches!(self, PeerConnectionState::Connecting)
    }
}

/// The state of a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// The channel is being established.
    Connecting,
    /// The channel can carry data.
    Open,
    /// The channel is shutting down.
    Closing,
    /// The channel is closed.
    Closed,
}

/// An ICE candidate, as exchanged over the signaling channel.
///
/// The wire form is the JSON `RTCIceCandidateInit` dictionary carried in
/// a trickle frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The candidate-attribute line.
    pub candidate: String,
    /// The media stream identification tag.
    pub sdp_mid: Option<String>,
    /// The index of the media description the candidate belongs to.
    pub sdp_m_line_index: Option<u32>,
}

impl IceCandidate {
    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from the JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Which ICE candidates a peer connection may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IceTransportPolicy {
    /// Any candidate type.
    #[default]
    All,
    /// Relay candidates only.
    Relay,
}

/// Configuration applied to a peer connection at construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RtcConfiguration {
    /// STUN/TURN servers.
    pub ice_servers: Vec<IceServer>,
    /// Candidate filtering policy.
    pub ice_transport_policy: IceTransportPolicy,
}

/// Construction-time options for a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelConfig {
    /// Whether frames are delivered in order.
    pub ordered: bool,
    /// Maximum retransmit count; `None` means unlimited.
    pub max_retransmits: Option<u16>,
}

/// A periodic stats report from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStats {
    /// The raw stats report.
    pub report: String,
}

/// Events a [`Transport`] delivers on the channel it was created with.
pub enum TransportEvent {
    /// The peer connection changed state.
    StateChanged(PeerConnectionState),
    /// A local ICE candidate was gathered and should be trickled to the
    /// peer.
    IceCandidate(IceCandidate),
    /// A local offer is ready and should be forwarded over signaling.
    Offer(SessionDescription),
    /// A remote media track was added (subscriber side).
    TrackAdded {
        /// Sid of the added track.
        track_sid: String,
        /// Sids of the streams the track belongs to.
        stream_sids: Vec<String>,
    },
    /// A remote media track was removed (subscriber side).
    TrackRemoved {
        /// Sid of the removed track.
        track_sid: String,
    },
    /// The remote peer opened a data channel towards us (subscriber
    /// side).
    DataChannelOpened(Arc<dyn DataChannel>),
    /// A periodic stats report, when stats reporting is enabled.
    Stats(TransportStats),
}

/// Events a [`DataChannel`] delivers on its event receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChannelEvent {
    /// The channel changed state.
    StateChanged(DataChannelState),
    /// A binary frame arrived.
    Message(Vec<u8>),
}

/// One WebRTC data channel.
#[async_trait]
pub trait DataChannel: Send + Sync + 'static {
    /// The channel's label.
    fn label(&self) -> &str;

    /// The channel's current state.
    fn state(&self) -> DataChannelState;

    /// Submit a binary frame. Returns `false` when the underlying stack
    /// rejected the buffer, mirroring the native send call.
    fn send(&self, data: &[u8]) -> bool;

    /// Take the channel's event receiver. Yields `Some` exactly once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DataChannelEvent>>;

    /// Close the channel.
    async fn close(&self) -> Result<(), EngineError>;
}

/// One peer connection.
///
/// Implementations deliver [`TransportEvent`]s on the channel handed to
/// [`TransportFactory::create_transport`]. Local offers produced by
/// [`Transport::negotiate`] and [`Transport::create_and_send_offer`]
/// surface as [`TransportEvent::Offer`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Which signaling target this transport is.
    fn target(&self) -> SignalTarget;

    /// Whether this transport's connected state defines session
    /// liveness.
    fn is_primary(&self) -> bool;

    /// The current peer-connection state.
    fn connection_state(&self) -> PeerConnectionState;

    /// Whether the peer connection is up.
    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Flag that the next offer/answer exchange restarts ICE.
    fn set_restarting_ice(&self, restarting: bool);

    /// Whether an ICE restart is pending.
    fn is_restarting_ice(&self) -> bool;

    /// Kick off (re)negotiation; the resulting offer surfaces as an
    /// event.
    fn negotiate(&self);

    /// Create an offer, optionally restarting ICE, and surface it as an
    /// event.
    async fn create_and_send_offer(&self, ice_restart: bool) -> Result<(), EngineError>;

    /// Apply a remote session description.
    async fn set_remote_description(&self, sdp: SessionDescription) -> Result<(), EngineError>;

    /// Create an answer to the current remote offer.
    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    /// Apply a local session description, returning the description as
    /// actually applied.
    async fn set_local_description(
        &self,
        sdp: SessionDescription,
    ) -> Result<SessionDescription, EngineError>;

    /// Add a remote ICE candidate.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    /// Create an outbound data channel. Publisher side only.
    fn data_channel(
        &self,
        label: &str,
        config: DataChannelConfig,
    ) -> Result<Arc<dyn DataChannel>, EngineError>;

    /// Close the peer connection.
    async fn close(&self) -> Result<(), EngineError>;
}

/// Constructs [`Transport`]s.
///
/// Native WebRTC libraries require their constructors and factory entry
/// points to run on one dedicated serial execution context.
/// Implementations own that discipline: callers of this trait must
/// never observe native factory calls running on their own task.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// Create a transport for `target`, delivering its events on
    /// `events`.
    async fn create_transport(
        &self,
        config: RtcConfiguration,
        target: SignalTarget,
        primary: bool,
        report_stats: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn Transport>, EngineError>;
}
