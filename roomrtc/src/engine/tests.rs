// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

use super::*;
use crate::config::Timeouts;
use crate::rtc::mock::{MockDataChannel, MockTransportFactory};
use crate::rtc::{
    DataChannelConfig, DataChannelState, PeerConnectionState, Transport, TransportEvent,
};
use crate::signal::mock::MockSignalClient;
use crate::signal::{SignalEvent, SignalingMode};
use crate::state::{ConnectionMode, ConnectionState, DisconnectReason, ReconnectMode};
use roomrtc_proto::{
    DataPacket, IceServer, JoinResponse, Message as _, SignalTarget, SpeakerInfo, SpeakerUpdate,
    TrackInfo, TrackKind, TrackSource, UserPacket, data_packet,
};
use std::time::Duration;

struct Harness {
    engine: Engine,
    signal: Arc<MockSignalClient>,
    factory: Arc<MockTransportFactory>,
}

fn fast_timeouts() -> Timeouts {
    Timeouts {
        join_response: Duration::from_secs(2),
        transport_state: Duration::from_secs(2),
        publisher_data_channel_open: Duration::from_secs(2),
        publish: Duration::from_secs(2),
        quick_reconnect_delay: Duration::from_millis(20),
    }
}

fn harness() -> Harness {
    harness_with(fast_timeouts())
}

fn harness_with(timeouts: Timeouts) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();
    let signal = Arc::new(MockSignalClient::new());
    let factory = Arc::new(MockTransportFactory::new());
    let engine = Engine::builder(factory.clone())
        .signal_client(signal.clone())
        .connect_options(ConnectOptions {
            timeouts,
            ..ConnectOptions::default()
        })
        .build();
    Harness {
        engine,
        signal,
        factory,
    }
}

fn join_response(subscriber_primary: bool) -> JoinResponse {
    JoinResponse {
        ice_servers: vec![IceServer {
            urls: vec!["stun:stun.example.com:3478".to_owned()],
            username: String::new(),
            credential: String::new(),
        }],
        subscriber_primary,
        room_sid: "RM_1".to_owned(),
        participant_sid: "PA_local".to_owned(),
    }
}

fn user_packet() -> UserPacket {
    UserPacket {
        participant_sid: "PA_local".to_owned(),
        payload: b"ping".to_vec(),
        destination_sids: Vec::new(),
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}",
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn eventually_info(engine: &Engine, what: &str, condition: impl Fn(&SessionInfo) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let info = engine.session_info().await.expect("engine alive");
        if condition(&info) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}",
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Happy connect with a subscriber-primary server: lazy publisher
/// negotiation, both transports constructed, both data channels with
/// wire-exact labels.
#[tokio::test]
async fn connect_with_subscriber_primary_negotiates_lazily() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(50));
    h.factory.connect_primary_after(Duration::from_millis(100));

    h.engine.connect("wss://host", "tok").await.unwrap();

    assert_eq!(
        h.engine.connection_state(),
        ConnectionState::Connected(ConnectionMode::Normal)
    );

    let records = h.factory.records();
    assert_eq!(records.len(), 2);
    let subscriber = records
        .iter()
        .find(|record| record.target == SignalTarget::Subscriber)
        .unwrap();
    assert!(subscriber.primary);
    // The join's ICE servers were merged into the transport config.
    assert_eq!(subscriber.config.ice_servers.len(), 1);
    let publisher = records
        .iter()
        .find(|record| record.target == SignalTarget::Publisher)
        .unwrap();
    assert!(!publisher.primary);

    let publisher = h.factory.transport(SignalTarget::Publisher).unwrap();
    let reliable = publisher.channel("_reliable").unwrap();
    assert_eq!(
        reliable.config(),
        DataChannelConfig {
            ordered: true,
            max_retransmits: None,
        }
    );
    let lossy = publisher.channel("_lossy").unwrap();
    assert_eq!(
        lossy.config(),
        DataChannelConfig {
            ordered: true,
            max_retransmits: Some(0),
        }
    );

    // Lazy negotiation: nothing published, no eager offer.
    assert_eq!(publisher.negotiate_count(), 0);
    let info = h.engine.session_info().await.unwrap();
    assert!(!info.has_published);
    assert!(info.subscriber_primary);
    assert_eq!(info.url.as_deref(), Some("wss://host"));
    assert_eq!(info.token.as_deref(), Some("tok"));

    // Buffered signal frames were released after the transports were
    // configured.
    assert_eq!(h.signal.resume_count(), 1);
}

/// With a publisher-primary server the first offer can't wait for a
/// track: negotiation is eager.
#[tokio::test]
async fn connect_with_publisher_primary_negotiates_eagerly() {
    let h = harness();
    h.signal
        .script_join(join_response(false), Duration::from_millis(50));
    h.factory.connect_primary_after(Duration::from_millis(100));

    h.engine.connect("wss://host", "tok").await.unwrap();

    let publisher = h.factory.transport(SignalTarget::Publisher).unwrap();
    assert_eq!(publisher.negotiate_count(), 1);

    let info = h.engine.session_info().await.unwrap();
    assert!(info.has_published);
    assert!(!info.subscriber_primary);

    // The offer produced by negotiation reaches the signaling channel.
    eventually("offer forwarded to signaling", || {
        !h.signal.sent_offers().is_empty()
    })
    .await;
}

/// A send issued before the publisher is up suspends, kicks off lazy
/// negotiation, and completes once transport and channel are ready with
/// a byte-exact wire frame.
#[tokio::test]
async fn send_waits_for_publisher_readiness_and_is_byte_exact() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let publisher = h.factory.transport(SignalTarget::Publisher).unwrap();
    assert_eq!(publisher.connection_state(), PeerConnectionState::New);

    let packet = user_packet();
    let send = {
        let engine = h.engine.clone();
        let packet = packet.clone();
        tokio::spawn(async move { engine.send(packet, Reliability::Reliable).await })
    };

    // The send triggered negotiation because the publisher was idle.
    eventually("lazy negotiation", || publisher.negotiate_count() == 1).await;

    publisher.set_connection_state(PeerConnectionState::Connected);
    publisher
        .channel("_reliable")
        .unwrap()
        .set_state(DataChannelState::Open);

    send.await.unwrap().unwrap();

    let sent = publisher.channel("_reliable").unwrap().sent();
    let expected = DataPacket {
        kind: data_packet::Kind::Reliable as i32,
        value: Some(data_packet::Value::User(packet)),
    }
    .encode_to_vec();
    assert_eq!(sent, vec![expected]);
    assert!(publisher.channel("_lossy").unwrap().sent().is_empty());
}

/// A failed primary transport drives one quick reconnect: signaling
/// reconnects with the quick mode, the subscriber restarts ICE, the
/// published publisher re-offers with an ICE restart, and queued
/// requests are flushed.
#[tokio::test]
async fn primary_failure_drives_quick_reconnect() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    h.engine.publisher_should_negotiate();
    eventually_info(&h.engine, "has_published", |info| info.has_published).await;

    let subscriber = h.factory.transport(SignalTarget::Subscriber).unwrap();
    let publisher = h.factory.transport(SignalTarget::Publisher).unwrap();

    subscriber.set_connection_state(PeerConnectionState::Failed);

    // The engine reconnects signaling with the quick mode.
    eventually("quick signaling reconnect", || h.signal.connects().len() == 2).await;
    assert_eq!(
        h.signal.connects()[1].mode,
        SignalingMode::Reconnect(ReconnectMode::Quick)
    );
    assert!(h.engine.connection_state().is_reconnecting());

    // Primary comes back.
    subscriber.set_connection_state(PeerConnectionState::Connected);

    // Because we had published, the publisher re-offers with an ICE
    // restart.
    eventually("ice restart offer", || publisher.offers().contains(&true)).await;
    publisher.set_connection_state(PeerConnectionState::Connected);

    eventually("reconnected", || {
        h.engine.connection_state()
            == ConnectionState::Connected(ConnectionMode::Reconnect(ReconnectMode::Quick))
    })
    .await;

    assert!(subscriber.is_restarting_ice());
    assert_eq!(h.signal.queued_flush_count(), 1);
    // One quick attempt was enough.
    assert_eq!(h.signal.connects().len(), 2);
}

/// When every quick attempt times out the engine degrades to a full
/// reconnect: RTC state is torn down and the initial connect sequence
/// re-runs against the same URL and token.
#[tokio::test]
async fn quick_reconnect_failure_degrades_to_full() {
    let h = harness_with(Timeouts {
        transport_state: Duration::from_millis(150),
        quick_reconnect_delay: Duration::from_millis(20),
        ..fast_timeouts()
    });
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(30));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let first_subscriber = h.factory.transport(SignalTarget::Subscriber).unwrap();
    first_subscriber.set_connection_state(PeerConnectionState::Failed);

    // 1 fresh + 3 failed quick attempts + 1 full.
    eventually("all reconnect attempts", || h.signal.connects().len() == 5).await;
    let modes: Vec<SignalingMode> = h
        .signal
        .connects()
        .iter()
        .map(|record| record.mode)
        .collect();
    assert_eq!(
        modes,
        vec![
            SignalingMode::Fresh,
            SignalingMode::Reconnect(ReconnectMode::Quick),
            SignalingMode::Reconnect(ReconnectMode::Quick),
            SignalingMode::Reconnect(ReconnectMode::Quick),
            SignalingMode::Reconnect(ReconnectMode::Full),
        ]
    );

    eventually("full reconnect complete", || {
        h.engine.connection_state()
            == ConnectionState::Connected(ConnectionMode::Reconnect(ReconnectMode::Full))
    })
    .await;

    // The old RTC state was torn down and rebuilt.
    assert!(first_subscriber.is_closed());
    assert_eq!(h.factory.transports().len(), 4);
    assert_eq!(h.signal.resume_count(), 2);

    let info = h.engine.session_info().await.unwrap();
    assert_eq!(info.url.as_deref(), Some("wss://host"));
    assert_eq!(info.token.as_deref(), Some("tok"));
}

/// A non-recoverable server leave tears everything down promptly and
/// starts no reconnect.
#[tokio::test]
async fn non_recoverable_leave_cleans_up_without_reconnect() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    h.signal.emit(SignalEvent::Leave {
        can_reconnect: false,
    });

    eventually("disconnected", || {
        h.engine.connection_state()
            == ConnectionState::Disconnected(DisconnectReason::Network(None))
    })
    .await;

    let info = h.engine.session_info().await.unwrap();
    assert_eq!(info.url, None);
    assert_eq!(info.token, None);
    assert!(!info.has_published);

    for transport in h.factory.transports() {
        assert!(transport.is_closed());
    }

    // No reconnect was attempted: the only signaling connect is the
    // original one, and the signal client was torn down with the
    // network reason.
    assert_eq!(h.signal.connects().len(), 1);
    assert_eq!(
        h.signal.clean_ups().last(),
        Some(&DisconnectReason::Network(None))
    );
}

/// A failed connect surfaces its error and leaves the engine torn
/// down with a network reason.
#[tokio::test]
async fn connect_failure_surfaces_and_cleans_up() {
    let h = harness_with(Timeouts {
        join_response: Duration::from_millis(100),
        ..fast_timeouts()
    });
    // Nothing scripted: the join response never arrives.
    let err = h.engine.connect("wss://host", "tok").await.unwrap_err();
    assert!(matches!(err, EngineError::SignalTimedOut(_)));

    assert!(matches!(
        h.engine.connection_state(),
        ConnectionState::Disconnected(DisconnectReason::Network(Some(_)))
    ));
    let info = h.engine.session_info().await.unwrap();
    assert_eq!(info.url, None);
    assert_eq!(info.token, None);
}

/// An OS network-path switch while connected drives a quick reconnect.
#[tokio::test]
async fn network_path_change_drives_reconnect() {
    let signal = Arc::new(MockSignalClient::new());
    let factory = Arc::new(MockTransportFactory::new());
    let monitor = Arc::new(crate::connectivity::MockNetworkMonitor::new());
    let engine = Engine::builder(factory.clone())
        .signal_client(signal.clone())
        .network_monitor(monitor.clone())
        .connect_options(ConnectOptions {
            timeouts: fast_timeouts(),
            ..ConnectOptions::default()
        })
        .build();

    signal.script_join(join_response(true), Duration::from_millis(10));
    factory.connect_primary_after(Duration::from_millis(20));
    engine.connect("wss://host", "tok").await.unwrap();

    monitor.trigger_path_change();

    eventually("quick reconnect after path change", || {
        signal.connects().len() == 2
    })
    .await;
    assert_eq!(
        signal.connects()[1].mode,
        SignalingMode::Reconnect(ReconnectMode::Quick)
    );

    // The transports never dropped, so their completers are still
    // resolved and the quick resume completes by itself.
    eventually("reconnected", || {
        engine.connection_state()
            == ConnectionState::Connected(ConnectionMode::Reconnect(ReconnectMode::Quick))
    })
    .await;
    assert_eq!(signal.queued_flush_count(), 1);
}

/// A user-initiated close aborts an in-flight reconnect at the next
/// barrier.
#[tokio::test]
async fn user_close_aborts_reconnect() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let subscriber = h.factory.transport(SignalTarget::Subscriber).unwrap();
    subscriber.set_connection_state(PeerConnectionState::Failed);
    eventually("reconnect started", || h.signal.connects().len() == 2).await;

    h.engine.close().await;
    assert_eq!(
        h.engine.connection_state(),
        ConnectionState::Disconnected(DisconnectReason::User)
    );

    // The aborted pipeline must not keep dialing or flip the state
    // back.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.signal.connects().len(), 2);
    assert_eq!(
        h.engine.connection_state(),
        ConnectionState::Disconnected(DisconnectReason::User)
    );
}

/// Exactly one delegate notification per state transition, with the
/// old and new states as observed.
#[tokio::test]
async fn state_transitions_notify_delegates_exactly_once() {
    struct Recorder {
        transitions: std::sync::Mutex<Vec<(ConnectionState, ConnectionState)>>,
    }

    impl crate::delegate::EngineDelegate for Recorder {
        fn on_connection_state_changed(&self, old: &ConnectionState, new: &ConnectionState) {
            self.transitions
                .lock()
                .unwrap()
                .push((old.clone(), new.clone()));
        }
    }

    let h = harness();
    let recorder = Arc::new(Recorder {
        transitions: std::sync::Mutex::new(Vec::new()),
    });
    h.engine.add_delegate(&recorder);

    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let transitions = recorder.transitions.lock().unwrap().clone();
    assert_eq!(
        transitions,
        vec![
            (
                ConnectionState::Disconnected(DisconnectReason::Sdk),
                ConnectionState::Connecting(ConnectionMode::Normal),
            ),
            (
                ConnectionState::Connecting(ConnectionMode::Normal),
                ConnectionState::Connected(ConnectionMode::Normal),
            ),
        ]
    );
}

/// Inbound data-channel frames are decoded and fanned out; undecodable
/// and unknown frames are dropped.
#[tokio::test]
async fn inbound_data_frames_fan_out_to_delegates() {
    struct Recorder {
        packets: std::sync::Mutex<Vec<UserPacket>>,
        speakers: std::sync::Mutex<Vec<Vec<SpeakerInfo>>>,
    }

    impl crate::delegate::EngineDelegate for Recorder {
        fn on_user_packet(&self, packet: &UserPacket) {
            self.packets.lock().unwrap().push(packet.clone());
        }
        fn on_speakers_changed(&self, speakers: &[SpeakerInfo]) {
            self.speakers.lock().unwrap().push(speakers.to_vec());
        }
    }

    let h = harness();
    let recorder = Arc::new(Recorder {
        packets: std::sync::Mutex::new(Vec::new()),
        speakers: std::sync::Mutex::new(Vec::new()),
    });
    h.engine.add_delegate(&recorder);

    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    // The subscriber-side channels arrive from the remote peer.
    let subscriber = h.factory.transport(SignalTarget::Subscriber).unwrap();
    let remote = Arc::new(MockDataChannel::new(
        "_reliable",
        DataChannelConfig {
            ordered: true,
            max_retransmits: None,
        },
    ));
    subscriber.emit(TransportEvent::DataChannelOpened(remote.clone()));

    // Undecodable bytes are dropped without side effects.
    remote.receive(vec![0xff, 0xff, 0xff]);

    let packet = user_packet();
    remote.receive(
        DataPacket {
            kind: data_packet::Kind::Reliable as i32,
            value: Some(data_packet::Value::User(packet.clone())),
        }
        .encode_to_vec(),
    );
    remote.receive(
        DataPacket {
            kind: data_packet::Kind::Lossy as i32,
            value: Some(data_packet::Value::Speaker(SpeakerUpdate {
                speakers: vec![SpeakerInfo {
                    sid: "PA_x".to_owned(),
                    level: 0.8,
                    active: true,
                }],
            })),
        }
        .encode_to_vec(),
    );

    eventually("user packet delivered", || {
        *recorder.packets.lock().unwrap() == [packet.clone()]
    })
    .await;
    eventually("speakers delivered", || {
        recorder.speakers.lock().unwrap().len() == 1
    })
    .await;
}

/// A rejected native send surfaces as a WebRTC error.
#[tokio::test]
async fn rejected_data_channel_send_is_a_webrtc_error() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let publisher = h.factory.transport(SignalTarget::Publisher).unwrap();
    publisher.set_connection_state(PeerConnectionState::Connected);
    let reliable = publisher.channel("_reliable").unwrap();
    reliable.set_state(DataChannelState::Open);
    reliable.set_fail_sends(true);

    let err = h
        .engine
        .send(user_packet(), Reliability::Reliable)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WebRtc(_)));
}

/// Sending with no session at all fails with a state error.
#[tokio::test]
async fn send_without_session_is_a_state_error() {
    let h = harness();
    let err = h
        .engine
        .send(user_packet(), Reliability::Reliable)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::State(_)));
}

/// Add-track round trip: the populated request is sent and the server's
/// track info is paired with the populator's result.
#[tokio::test]
async fn add_track_round_trip() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    h.signal.script_track_response(
        "cid-1",
        TrackInfo {
            sid: "TR_1".to_owned(),
            name: "camera".to_owned(),
            kind: TrackKind::Video as i32,
            source: TrackSource::Camera as i32,
            muted: false,
        },
    );

    let (result, info) = h
        .engine
        .add_track("cid-1", "camera", TrackKind::Video, TrackSource::Camera, |request| {
            request.muted = true;
            42u32
        })
        .await
        .unwrap();

    assert_eq!(result, 42);
    assert_eq!(info.sid, "TR_1");

    let sent = h.signal.sent_add_tracks();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].cid, "cid-1");
    assert!(sent[0].muted);
}

/// A timed-out add-track response surfaces as an engine timeout.
#[tokio::test]
async fn add_track_times_out_without_response() {
    let h = harness_with(Timeouts {
        publish: Duration::from_millis(100),
        ..fast_timeouts()
    });
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let err = h
        .engine
        .add_track("cid-1", "mic", TrackKind::Audio, TrackSource::Microphone, |_| ())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EngineTimedOut(_)));
}

/// Token rotation updates the stored token for later reconnects.
#[tokio::test]
async fn refresh_token_updates_session_identity() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    h.signal
        .emit(SignalEvent::RefreshToken("tok-rotated".to_owned()));

    eventually_info(&h.engine, "token rotated", |info| {
        info.token.as_deref() == Some("tok-rotated")
    })
    .await;
    // The URL is untouched.
    let info = h.engine.session_info().await.unwrap();
    assert_eq!(info.url.as_deref(), Some("wss://host"));
}

/// Remote ICE candidates are routed to the transport the trickle frame
/// names.
#[tokio::test]
async fn trickled_candidates_route_by_target() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    let candidate = crate::rtc::IceCandidate {
        candidate: "candidate:1 1 udp 1 198.51.100.4 40000 typ host".to_owned(),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
    };
    h.signal.emit(SignalEvent::Trickle {
        candidate: candidate.clone(),
        target: SignalTarget::Subscriber,
    });

    let subscriber = h.factory.transport(SignalTarget::Subscriber).unwrap();
    let publisher = h.factory.transport(SignalTarget::Publisher).unwrap();
    eventually("candidate routed", || {
        subscriber.candidates() == [candidate.clone()]
    })
    .await;
    assert!(publisher.candidates().is_empty());
}

/// A server offer runs the full answer exchange on the subscriber.
#[tokio::test]
async fn server_offer_is_answered_on_the_subscriber() {
    let h = harness();
    h.signal
        .script_join(join_response(true), Duration::from_millis(10));
    h.factory.connect_primary_after(Duration::from_millis(20));
    h.engine.connect("wss://host", "tok").await.unwrap();

    h.signal.emit(SignalEvent::Offer(
        roomrtc_proto::SessionDescription::offer("v=0 remote"),
    ));

    let subscriber = h.factory.transport(SignalTarget::Subscriber).unwrap();
    eventually("remote description applied", || {
        subscriber.remote_descriptions().len() == 1
    })
    .await;
    eventually("answer sent", || h.signal.sent_answers().len() == 1).await;
}
