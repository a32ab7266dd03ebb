// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Signaling channel messages.
//!
//! One envelope per WebSocket binary frame: the client sends
//! [`SignalRequest`]s and receives [`SignalResponse`]s.

use crate::model::{IceServer, TrackInfo, TrackKind, TrackSource};

/// A client → server signaling frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignalRequest {
    /// The request payload.
    #[prost(oneof = "signal_request::Message", tags = "1, 2, 3, 4, 5")]
    pub message: Option<signal_request::Message>,
}

/// Nested types for [`SignalRequest`].
pub mod signal_request {
    /// Payload of a [`super::SignalRequest`].
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        /// An SDP offer for the publisher peer connection.
        #[prost(message, tag = "1")]
        Offer(super::SessionDescription),
        /// An SDP answer for the subscriber peer connection.
        #[prost(message, tag = "2")]
        Answer(super::SessionDescription),
        /// A trickled local ICE candidate.
        #[prost(message, tag = "3")]
        Trickle(super::TrickleRequest),
        /// A request to publish a track.
        #[prost(message, tag = "4")]
        AddTrack(super::AddTrackRequest),
        /// Notice that the client is leaving the session.
        #[prost(message, tag = "5")]
        Leave(super::LeaveRequest),
    }
}

/// A server → client signaling frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignalResponse {
    /// The response payload.
    #[prost(oneof = "signal_response::Message", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub message: Option<signal_response::Message>,
}

/// Nested types for [`SignalResponse`].
pub mod signal_response {
    /// Payload of a [`super::SignalResponse`].
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        /// The initial join frame; always the first frame of a session.
        #[prost(message, tag = "1")]
        Join(super::JoinResponse),
        /// An SDP answer for the publisher peer connection.
        #[prost(message, tag = "2")]
        Answer(super::SessionDescription),
        /// An SDP offer for the subscriber peer connection.
        #[prost(message, tag = "3")]
        Offer(super::SessionDescription),
        /// A trickled remote ICE candidate.
        #[prost(message, tag = "4")]
        Trickle(super::TrickleRequest),
        /// Confirmation that a requested track was published.
        #[prost(message, tag = "5")]
        TrackPublished(super::TrackPublishedResponse),
        /// Server-initiated leave.
        #[prost(message, tag = "6")]
        Leave(super::LeaveRequest),
        /// A rotated access token to use for subsequent reconnects.
        #[prost(string, tag = "7")]
        RefreshToken(String),
    }
}

/// Which peer connection a signaling message refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SignalTarget {
    /// The publisher peer connection.
    Publisher = 0,
    /// The subscriber peer connection.
    Subscriber = 1,
}

/// An SDP session description.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionDescription {
    /// `"offer"` or `"answer"`.
    #[prost(string, tag = "1")]
    pub kind: String,
    /// The SDP body.
    #[prost(string, tag = "2")]
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_owned(),
            sdp: sdp.into(),
        }
    }

    /// Build an answer description.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_owned(),
            sdp: sdp.into(),
        }
    }
}

/// A trickled ICE candidate.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrickleRequest {
    /// The candidate as a JSON `RTCIceCandidateInit` payload.
    #[prost(string, tag = "1")]
    pub candidate_init: String,
    /// Which peer connection the candidate belongs to.
    #[prost(enumeration = "SignalTarget", tag = "2")]
    pub target: i32,
}

/// The server's initial join frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JoinResponse {
    /// ICE servers the client must use for both peer connections.
    #[prost(message, repeated, tag = "1")]
    pub ice_servers: Vec<IceServer>,
    /// Whether the subscriber connection is the session-defining one.
    #[prost(bool, tag = "2")]
    pub subscriber_primary: bool,
    /// Server-assigned room sid.
    #[prost(string, tag = "3")]
    pub room_sid: String,
    /// Server-assigned sid for the local participant.
    #[prost(string, tag = "4")]
    pub participant_sid: String,
}

/// A leave notice, in either direction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LeaveRequest {
    /// When sent by the server: whether the client may resume the
    /// session by reconnecting.
    #[prost(bool, tag = "1")]
    pub can_reconnect: bool,
}

/// A request to publish a track.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddTrackRequest {
    /// Client-generated track cid, used to correlate the response.
    #[prost(string, tag = "1")]
    pub cid: String,
    /// Participant-supplied track name.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Media kind of the track.
    #[prost(enumeration = "TrackKind", tag = "3")]
    pub kind: i32,
    /// Capture source of the track.
    #[prost(enumeration = "TrackSource", tag = "4")]
    pub source: i32,
    /// Whether the track starts muted.
    #[prost(bool, tag = "5")]
    pub muted: bool,
}

/// Confirmation that a requested track was published.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrackPublishedResponse {
    /// The cid from the originating [`AddTrackRequest`].
    #[prost(string, tag = "1")]
    pub cid: String,
    /// Server-side info for the published track.
    #[prost(message, optional, tag = "2")]
    pub track: Option<TrackInfo>,
}
