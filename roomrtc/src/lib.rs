// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Session engine for SFU-based WebRTC rooms.
//!
//! This crate implements the client-side session lifecycle against a
//! selective-forwarding media server: a signaling channel, a publisher
//! and a subscriber peer connection, two publisher data channels for
//! application data, and the reconnection protocol that keeps a session
//! alive across the failures mobile networks impose (path switches, ICE
//! failures, transient signaling loss).
//!
//! The centerpiece is [`Engine`]:
//!
//! ```rust,no_run
//! use roomrtc::{Engine, Reliability};
//! use roomrtc::proto::UserPacket;
//! # use std::sync::Arc;
//! # async fn example(factory: Arc<dyn roomrtc::rtc::TransportFactory>) -> Result<(), roomrtc::EngineError> {
//! let engine = Engine::new(factory);
//! engine.connect("wss://rtc.example.com", "token").await?;
//!
//! engine
//!     .send(
//!         UserPacket {
//!             participant_sid: String::new(),
//!             payload: b"hello".to_vec(),
//!             destination_sids: Vec::new(),
//!         },
//!         Reliability::Reliable,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Media capture, encoding and the room/participant object model are
//! out of scope: the engine consumes a [`signal::SignalClient`], a
//! [`rtc::Transport`] factory and a [`connectivity::NetworkMonitor`]
//! through traits, and emits lifecycle notifications to registered
//! [`delegate::EngineDelegate`]s.

pub mod config;
pub mod connectivity;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod rtc;
pub mod signal;
pub mod state;
pub mod utils;

/// The wire protocol types.
pub use roomrtc_proto as proto;

// Expose the most common things at the top level:
pub use config::{ConnectOptions, RoomOptions, Timeouts};
pub use delegate::EngineDelegate;
pub use engine::{Engine, EngineBuilder, Reliability, SessionInfo};
pub use error::EngineError;
pub use state::{ConnectionMode, ConnectionState, DisconnectReason, ReconnectMode};
