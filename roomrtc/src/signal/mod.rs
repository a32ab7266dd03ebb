// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The bidirectional signaling channel the engine drives.
//!
//! [`SignalClient`] is the consumed interface; [`ws::WsSignalClient`]
//! is the production implementation over a WebSocket. The contract the
//! engine relies on: after [`SignalClient::connect`] with
//! [`SignalingMode::Fresh`], no inbound frame other than the join
//! response is delivered until [`SignalClient::resume_response_queue`]
//! is invoked.

use crate::error::EngineError;
use crate::rtc::IceCandidate;
use crate::state::{DisconnectReason, ReconnectMode};
use crate::utils::Completer;
use async_trait::async_trait;
use roomrtc_proto::{AddTrackRequest, JoinResponse, SessionDescription, SignalTarget, TrackInfo};
use tokio::sync::mpsc;

#[cfg(any(test, feature = "mock-client"))]
pub mod mock;
pub mod ws;

/// How a signaling connection is being established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingMode {
    /// A brand new session.
    Fresh,
    /// Resuming or re-establishing an existing session.
    Reconnect(ReconnectMode),
}

impl SignalingMode {
    /// Whether this is a reconnect of either mode.
    pub fn is_reconnect(self) -> bool {
        matches!(self, SignalingMode::Reconnect(_))
    }
}

/// The state of the signaling connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalConnectionState {
    /// The socket is being established.
    Connecting,
    /// The socket is up.
    Connected,
    /// The socket is down.
    Disconnected(DisconnectReason),
}

/// Options forwarded to the server when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOptions {
    /// Whether the server should automatically subscribe us to the
    /// room's tracks.
    pub auto_subscribe: bool,
}

/// Events a [`SignalClient`] delivers to its attached listener.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// The signaling connection changed state.
    ConnectionState(SignalConnectionState),
    /// The server sent an offer for the subscriber peer connection.
    Offer(SessionDescription),
    /// The server sent an answer for the publisher peer connection.
    Answer(SessionDescription),
    /// The server trickled a remote ICE candidate.
    Trickle {
        /// The candidate.
        candidate: IceCandidate,
        /// Which peer connection it belongs to.
        target: SignalTarget,
    },
    /// The server asked us to leave.
    Leave {
        /// Whether the session may be resumed by reconnecting.
        can_reconnect: bool,
    },
    /// The server rotated our access token.
    RefreshToken(String),
}

/// A bidirectional signaling channel.
#[async_trait]
pub trait SignalClient: Send + Sync + 'static {
    /// Attach the listener that receives [`SignalEvent`]s. Called once,
    /// before the first connect.
    fn attach_listener(&self, events: mpsc::UnboundedSender<SignalEvent>);

    /// Establish (or re-establish) the signaling socket.
    async fn connect(
        &self,
        url: &str,
        token: &str,
        options: SignalOptions,
        mode: SignalingMode,
    ) -> Result<(), EngineError>;

    /// Tear the socket down. Idempotent.
    async fn clean_up(&self, reason: DisconnectReason);

    /// The completer resolved by the server's initial join frame, once
    /// per session.
    fn join_response(&self) -> Completer<JoinResponse>;

    /// Release inbound frames buffered since connect. Until this is
    /// called, only the join frame is delivered (by resolving the join
    /// completer).
    fn resume_response_queue(&self);

    /// Send a publisher offer.
    async fn send_offer(&self, offer: SessionDescription) -> Result<(), EngineError>;

    /// Send a subscriber answer.
    async fn send_answer(&self, answer: SessionDescription) -> Result<(), EngineError>;

    /// Trickle a local ICE candidate for `target`.
    async fn send_candidate(
        &self,
        candidate: IceCandidate,
        target: SignalTarget,
    ) -> Result<(), EngineError>;

    /// Request publication of a track.
    async fn send_add_track(&self, request: AddTrackRequest) -> Result<(), EngineError>;

    /// Notify the server that we're leaving.
    async fn send_leave(&self) -> Result<(), EngineError>;

    /// Flush requests that were queued while the socket was down.
    async fn send_queued_requests(&self) -> Result<(), EngineError>;

    /// Reserve the completer that the track-published response for
    /// `cid` will resolve.
    fn prepare_track_completer(&self, cid: &str) -> Completer<TrackInfo>;
}
