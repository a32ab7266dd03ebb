// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Types representing the errors that can be returned.

/// This encapsulates any errors that could be emitted by the engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An operation was attempted in a state that doesn't permit it,
    /// for example sending while no publisher transport exists or
    /// starting a reconnect while one is already in flight. Never
    /// retried; surfaced to the caller.
    #[error("invalid state: {0}")]
    State(String),
    /// A deadline waiting on the signaling channel elapsed.
    #[error("signal timed out: {0}")]
    SignalTimedOut(String),
    /// A deadline waiting on a peer connection or data channel elapsed.
    #[error("transport timed out: {0}")]
    TransportTimedOut(String),
    /// A deadline waiting on an engine-level response elapsed.
    #[error("engine timed out: {0}")]
    EngineTimedOut(String),
    /// The underlying WebRTC stack rejected an operation.
    #[error("webrtc error: {0}")]
    WebRtc(String),
    /// An OS or signaling socket I/O error.
    #[error("network error: {0}")]
    Network(String),
    /// The signaling WebSocket failed.
    #[error("websocket error: {0}")]
    Websocket(String),
    /// A protobuf frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    /// A JSON payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The operation was cancelled, either by a completer reset during
    /// teardown or by a user-initiated disconnect aborting a reconnect.
    /// Surfaced, but not a failure of the session itself.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl EngineError {
    /// Create a [`EngineError::State`] from anything stringy.
    pub fn state<S: Into<String>>(s: S) -> EngineError {
        EngineError::State(s.into())
    }

    /// Whether this error is one of the timeout kinds.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EngineError::SignalTimedOut(_)
                | EngineError::TransportTimedOut(_)
                | EngineError::EngineTimedOut(_)
        )
    }

    /// Whether this error was caused by a cancellation rather than a
    /// failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled(_))
    }
}
