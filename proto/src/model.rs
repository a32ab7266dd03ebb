// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Data-plane and shared model messages.

/// A single frame on the `_reliable` or `_lossy` data channel.
///
/// Unknown `value` variants decode to `None` and are ignored by
/// receivers, which is what allows the wire format to grow without
/// breaking older peers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataPacket {
    /// Which delivery class the packet was sent under.
    #[prost(enumeration = "data_packet::Kind", tag = "1")]
    pub kind: i32,
    /// The packet payload.
    #[prost(oneof = "data_packet::Value", tags = "2, 3")]
    pub value: Option<data_packet::Value>,
}

/// Nested types for [`DataPacket`].
pub mod data_packet {
    /// Delivery class of a [`super::DataPacket`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Kind {
        /// Delivered in order with unlimited retransmits.
        Reliable = 0,
        /// Delivered in order with no retransmits.
        Lossy = 1,
    }

    /// Payload carried by a [`super::DataPacket`].
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        /// An active-speaker change pushed by the server.
        #[prost(message, tag = "2")]
        Speaker(super::SpeakerUpdate),
        /// An application payload published by a participant.
        #[prost(message, tag = "3")]
        User(super::UserPacket),
    }
}

/// An application payload published by a participant.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserPacket {
    /// Sid of the participant that published the payload.
    #[prost(string, tag = "1")]
    pub participant_sid: String,
    /// Opaque application bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// Sids the payload is addressed to; empty means everyone.
    #[prost(string, repeated, tag = "3")]
    pub destination_sids: Vec<String>,
}

/// Active-speaker levels pushed by the server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpeakerUpdate {
    /// Speakers that changed, loudest first.
    #[prost(message, repeated, tag = "1")]
    pub speakers: Vec<SpeakerInfo>,
}

/// One speaker entry in a [`SpeakerUpdate`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpeakerInfo {
    /// Sid of the speaking participant.
    #[prost(string, tag = "1")]
    pub sid: String,
    /// Audio level, 0–1.
    #[prost(float, tag = "2")]
    pub level: f32,
    /// Whether the participant is currently speaking.
    #[prost(bool, tag = "3")]
    pub active: bool,
}

/// Server-side description of a published track.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrackInfo {
    /// Server-assigned track sid.
    #[prost(string, tag = "1")]
    pub sid: String,
    /// Participant-supplied track name.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Media kind of the track.
    #[prost(enumeration = "TrackKind", tag = "3")]
    pub kind: i32,
    /// Capture source of the track.
    #[prost(enumeration = "TrackSource", tag = "4")]
    pub source: i32,
    /// Whether the track is muted.
    #[prost(bool, tag = "5")]
    pub muted: bool,
}

/// Media kind of a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TrackKind {
    /// An audio track.
    Audio = 0,
    /// A video track.
    Video = 1,
    /// A data track.
    Data = 2,
}

/// Capture source of a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TrackSource {
    /// Source not reported.
    Unknown = 0,
    /// A camera capture.
    Camera = 1,
    /// A microphone capture.
    Microphone = 2,
    /// A screen-share video capture.
    ScreenShare = 3,
    /// A screen-share audio capture.
    ScreenShareAudio = 4,
}

/// An ICE server entry handed out in the join response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IceServer {
    /// STUN/TURN URLs.
    #[prost(string, repeated, tag = "1")]
    pub urls: Vec<String>,
    /// TURN username, if required.
    #[prost(string, tag = "2")]
    pub username: String,
    /// TURN credential, if required.
    #[prost(string, tag = "3")]
    pub credential: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn data_packet_round_trips() {
        let packet = DataPacket {
            kind: data_packet::Kind::Lossy as i32,
            value: Some(data_packet::Value::User(UserPacket {
                participant_sid: "PA_x".to_owned(),
                payload: vec![1, 2, 3],
                destination_sids: vec!["PA_y".to_owned()],
            })),
        };

        let bytes = packet.encode_to_vec();
        let decoded = DataPacket::decode(&bytes[..]).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.kind(), data_packet::Kind::Lossy);
    }

    #[test]
    fn unknown_value_variant_decodes_to_none() {
        // A frame containing only an unknown length-delimited field
        // (tag 15) should decode with no payload set.
        let mut bytes = DataPacket {
            kind: data_packet::Kind::Reliable as i32,
            value: None,
        }
        .encode_to_vec();
        bytes.extend_from_slice(&[0x7a, 0x02, 0x08, 0x01]);

        let decoded = DataPacket::decode(&bytes[..]).unwrap();
        assert_eq!(decoded.value, None);
        assert_eq!(decoded.kind(), data_packet::Kind::Reliable);
    }

    #[test]
    fn unknown_enum_value_falls_back_to_reliable() {
        let packet = DataPacket {
            kind: 99,
            value: None,
        };
        assert_eq!(packet.kind(), data_packet::Kind::Reliable);
    }
}
