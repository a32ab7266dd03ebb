// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Wire protocol types for the roomrtc session engine.
//!
//! The signaling peer exchanges protobuf frames; each WebSocket binary
//! message carries one [`SignalRequest`] or [`SignalResponse`] envelope.
//! Application data travels over WebRTC data channels as serialized
//! [`DataPacket`] frames.
//!
//! The messages here are hand-maintained [`prost`] derives rather than
//! build-script output, so the crate builds without `protoc`. Tags are
//! wire-stable: changing them breaks compatibility with deployed peers.

mod model;
mod signal;

pub use model::{
    DataPacket, IceServer, SpeakerInfo, SpeakerUpdate, TrackInfo, TrackKind, TrackSource,
    UserPacket, data_packet,
};
pub use signal::{
    AddTrackRequest, JoinResponse, LeaveRequest, SessionDescription, SignalRequest, SignalResponse,
    SignalTarget, TrackPublishedResponse, TrickleRequest, signal_request, signal_response,
};

// Re-exported so downstream crates can encode/decode without naming prost
// in their own dependency list.
pub use prost::Message;
