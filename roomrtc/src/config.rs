// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Engine configuration.

use crate::rtc::RtcConfiguration;
use std::time::Duration;

/// How long to wait for the server's join frame after the signaling
/// socket is up.
pub const DEFAULT_JOIN_RESPONSE_TIMEOUT: Duration = Duration::from_secs(7);

/// How long to wait for a peer connection to reach the connected state.
pub const DEFAULT_TRANSPORT_STATE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for a publisher data channel to open.
pub const DEFAULT_PUBLISHER_DATA_CHANNEL_OPEN_TIMEOUT: Duration = Duration::from_secs(7);

/// How long to wait for the server to acknowledge an add-track request.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// The gap between quick-reconnect attempts. This is an inter-attempt
/// delay, not a wait deadline.
pub const DEFAULT_QUICK_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// How many quick-reconnect attempts to make before degrading to a full
/// reconnect.
pub const QUICK_RECONNECT_ATTEMPTS: u32 = 3;

/// The engine's well-known deadlines.
///
/// The defaults are right for real networks; overriding them is mainly
/// useful for tests and for embedders on unusual links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for the server's join frame.
    pub join_response: Duration,
    /// Deadline for a peer connection to reach the connected state.
    pub transport_state: Duration,
    /// Deadline for a publisher data channel to open.
    pub publisher_data_channel_open: Duration,
    /// Deadline for the server to acknowledge an add-track request.
    pub publish: Duration,
    /// Gap between quick-reconnect attempts.
    pub quick_reconnect_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            join_response: DEFAULT_JOIN_RESPONSE_TIMEOUT,
            transport_state: DEFAULT_TRANSPORT_STATE_TIMEOUT,
            publisher_data_channel_open: DEFAULT_PUBLISHER_DATA_CHANNEL_OPEN_TIMEOUT,
            publish: DEFAULT_PUBLISH_TIMEOUT,
            quick_reconnect_delay: DEFAULT_QUICK_RECONNECT_DELAY,
        }
    }
}

/// Options for establishing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Whether the server should automatically subscribe us to the
    /// room's tracks.
    pub auto_subscribe: bool,
    /// RTC configuration applied to both peer connections. The ICE
    /// server list is replaced by the server's own list on join unless
    /// set to something non-empty here.
    pub rtc: RtcConfiguration,
    /// The engine's deadlines.
    pub timeouts: Timeouts,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_subscribe: true,
            rtc: RtcConfiguration::default(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Options describing the room-level behavior of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomOptions {
    /// Whether transports should deliver periodic stats reports.
    pub report_stats: bool,
}

/// The engine's immutable configuration snapshot.
///
/// Taken when the engine is built, overridable per `connect` call, and
/// after that mutated only by the engine itself (token rotation and
/// ICE-server refresh).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    /// Connect-time options.
    pub connect: ConnectOptions,
    /// Room-level options.
    pub room: RoomOptions,
}
