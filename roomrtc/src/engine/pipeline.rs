// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The spawned connect, reconnect and send sequences.
//!
//! Pipelines hold only `Arc`'d collaborators plus a session generation;
//! every state mutation is a round trip through the actor, which
//! ignores requests from pipelines whose session has been torn down.

use super::actor::EngineMsg;
use super::{EngineShared, Reliability};
use crate::config::{QUICK_RECONNECT_ATTEMPTS, Timeouts};
use crate::error::EngineError;
use crate::rtc::Transport;
use crate::signal::{SignalOptions, SignalingMode};
use crate::state::{ConnectionMode, DisconnectReason, ReconnectMode};
use crate::utils::retry;
use roomrtc_proto::{DataPacket, Message as _, UserPacket, data_packet};
use std::sync::Arc;
use tokio::sync::oneshot;

const LOG_TARGET: &str = "roomrtc-engine";

fn timeouts(shared: &EngineShared) -> Timeouts {
    shared.config().connect.timeouts.clone()
}

fn signal_options(shared: &EngineShared) -> SignalOptions {
    SignalOptions {
        auto_subscribe: shared.config().connect.auto_subscribe,
    }
}

/// Send a message to the actor and wait for its reply.
async fn actor_roundtrip<T>(
    shared: &EngineShared,
    build: impl FnOnce(oneshot::Sender<T>) -> EngineMsg,
) -> Result<T, EngineError> {
    let (reply, rx) = oneshot::channel();
    shared
        .to_actor
        .send(build(reply))
        .map_err(|_| terminated())?;
    rx.await.map_err(|_| terminated())
}

fn terminated() -> EngineError {
    EngineError::Cancelled("engine terminated".to_owned())
}

/// The initial connect sequence: signaling up, join frame, transports
/// configured, buffered frames released, primary transport connected.
async fn full_connect_sequence(
    shared: &EngineShared,
    generation: u64,
    url: &str,
    token: &str,
    mode: SignalingMode,
) -> Result<(), EngineError> {
    let timeouts = timeouts(shared);

    shared
        .signal
        .connect(url, token, signal_options(shared), mode)
        .await?;

    let join = shared
        .signal
        .join_response()
        .wait(timeouts.join_response, || {
            EngineError::SignalTimedOut("failed to receive join response".to_owned())
        })
        .await?;
    let _ = shared.to_actor.send(EngineMsg::StopwatchSplit { name: "signal" });

    actor_roundtrip(shared, |reply| EngineMsg::ConfigureTransports {
        generation,
        join: Box::new(join),
        reply,
    })
    .await??;

    shared.signal.resume_response_queue();

    shared
        .completers
        .primary_transport_connected
        .wait(timeouts.transport_state, || {
            EngineError::TransportTimedOut("primary transport didn't connect".to_owned())
        })
        .await?;
    let _ = shared.to_actor.send(EngineMsg::StopwatchSplit { name: "engine" });

    Ok(())
}

/// Spawn the pipeline backing [`super::Engine::connect`].
pub(crate) fn spawn_connect(
    shared: Arc<EngineShared>,
    generation: u64,
    url: String,
    token: String,
    reply: oneshot::Sender<Result<(), EngineError>>,
) {
    tokio::spawn(async move {
        let result =
            full_connect_sequence(&shared, generation, &url, &token, SignalingMode::Fresh).await;

        match result {
            Ok(()) => {
                let established = actor_roundtrip(&shared, |reply| EngineMsg::SessionEstablished {
                    generation,
                    url,
                    token,
                    mode: ConnectionMode::Normal,
                    reply,
                })
                .await;
                let _ = reply.send(established);
            }
            Err(error) => {
                tracing::error!(target: LOG_TARGET, %error, "connect failed");
                // A cancellation means a newer operation already tore
                // the session down; don't tear its session down too.
                if !error.is_cancelled() {
                    let _ = actor_roundtrip(&shared, |reply| EngineMsg::CleanUp {
                        generation: Some(generation),
                        reason: DisconnectReason::Network(Some(error.to_string())),
                        reply,
                    })
                    .await;
                }
                let _ = reply.send(Err(error));
            }
        }
    });
}

/// Spawn the pipeline backing [`super::Engine::send`].
pub(crate) fn spawn_send(
    shared: Arc<EngineShared>,
    need_publisher_wait: bool,
    packet: UserPacket,
    reliability: Reliability,
    reply: oneshot::Sender<Result<(), EngineError>>,
) {
    tokio::spawn(async move {
        let _ = reply.send(send_packet(&shared, need_publisher_wait, packet, reliability).await);
    });
}

async fn send_packet(
    shared: &EngineShared,
    need_publisher_wait: bool,
    packet: UserPacket,
    reliability: Reliability,
) -> Result<(), EngineError> {
    if need_publisher_wait {
        let timeouts = timeouts(shared);

        // Both must be ready; await them concurrently.
        let transport_ready = shared
            .completers
            .publisher_transport_connected
            .wait(timeouts.transport_state, || {
                EngineError::TransportTimedOut("publisher transport didn't connect".to_owned())
            });
        let channel_ready = shared
            .completers
            .for_reliability(reliability)
            .wait(timeouts.publisher_data_channel_open, || {
                EngineError::TransportTimedOut("publisher data channel didn't open".to_owned())
            });
        futures::future::try_join(transport_ready, channel_ready).await?;
    }

    let dc = actor_roundtrip(shared, |reply| EngineMsg::PublisherDataChannel {
        reliability,
        reply,
    })
    .await?
    .ok_or_else(|| EngineError::state("Data channel is nil"))?;

    let frame = DataPacket {
        kind: reliability.wire_kind() as i32,
        value: Some(data_packet::Value::User(packet)),
    };

    if !dc.send(&frame.encode_to_vec()) {
        return Err(EngineError::WebRtc(
            "DataChannel.sendData returned false".to_owned(),
        ));
    }

    Ok(())
}

/// Everything a reconnect pipeline needs, captured when it starts.
pub(crate) struct ReconnectContext {
    pub generation: u64,
    pub url: String,
    pub token: String,
    pub publisher: Arc<dyn Transport>,
    pub subscriber: Arc<dyn Transport>,
    pub has_published: bool,
}

/// Spawn the reconnect pipeline: bounded quick attempts, then a single
/// full attempt, then teardown.
pub(crate) fn spawn_reconnect(shared: Arc<EngineShared>, ctx: ReconnectContext) {
    tokio::spawn(async move {
        let state = shared.state.clone();
        let quick = retry(
            QUICK_RECONNECT_ATTEMPTS,
            timeouts(&shared).quick_reconnect_delay,
            |_, _| state.borrow().is_reconnecting(),
            || quick_reconnect_sequence(&shared, &ctx),
        )
        .await;

        let result = match quick {
            Ok(()) => Ok((ReconnectMode::Quick, ctx.generation)),
            Err(error) => {
                if !shared.state.borrow().is_reconnecting() {
                    tracing::debug!(target: LOG_TARGET, "reconnect aborted");
                    return;
                }
                tracing::warn!(target: LOG_TARGET, %error, "quick reconnect failed, trying full reconnect");

                match actor_roundtrip(&shared, |reply| EngineMsg::DegradeToFullReconnect {
                    generation: ctx.generation,
                    reply,
                })
                .await
                {
                    Ok(Ok(())) => full_reconnect_sequence(&shared, &ctx)
                        .await
                        .map(|generation| (ReconnectMode::Full, generation)),
                    Ok(Err(_)) | Err(_) => {
                        tracing::debug!(target: LOG_TARGET, "reconnect aborted");
                        return;
                    }
                }
            }
        };

        match result {
            Ok((mode, generation)) => {
                let established = actor_roundtrip(&shared, |reply| EngineMsg::SessionEstablished {
                    generation,
                    url: ctx.url.clone(),
                    token: ctx.token.clone(),
                    mode: ConnectionMode::Reconnect(mode),
                    reply,
                })
                .await;
                if established.is_ok() {
                    tracing::info!(target: LOG_TARGET, ?mode, "reconnect complete");
                }
            }
            Err(error) => {
                if error.is_cancelled() || !shared.state.borrow().is_reconnecting() {
                    tracing::debug!(target: LOG_TARGET, "reconnect aborted");
                    return;
                }
                tracing::error!(target: LOG_TARGET, %error, "reconnect failed");
                let _ = actor_roundtrip(&shared, |reply| EngineMsg::CleanUp {
                    generation: None,
                    reason: DisconnectReason::Network(Some(error.to_string())),
                    reply,
                })
                .await;
            }
        }
    });
}

/// Abort barrier between reconnect stages: a user disconnect flips the
/// state out of reconnecting and the next barrier stops the sequence.
fn check_should_continue(shared: &EngineShared) -> Result<(), EngineError> {
    if shared.state.borrow().is_reconnecting() {
        Ok(())
    } else {
        Err(EngineError::state("Reconnection has been aborted"))
    }
}

/// Resume the existing session: reconnect signaling, wait for the
/// primary transport, restart ICE, flush queued requests.
async fn quick_reconnect_sequence(
    shared: &EngineShared,
    ctx: &ReconnectContext,
) -> Result<(), EngineError> {
    let timeouts = timeouts(shared);

    check_should_continue(shared)?;
    shared
        .signal
        .connect(
            &ctx.url,
            &ctx.token,
            signal_options(shared),
            SignalingMode::Reconnect(ReconnectMode::Quick),
        )
        .await?;

    check_should_continue(shared)?;
    shared
        .completers
        .primary_transport_connected
        .wait(timeouts.transport_state, || {
            EngineError::TransportTimedOut("primary transport didn't connect".to_owned())
        })
        .await?;

    check_should_continue(shared)?;
    ctx.subscriber.set_restarting_ice(true);

    if ctx.has_published {
        ctx.publisher.create_and_send_offer(true).await?;
        shared
            .completers
            .publisher_transport_connected
            .wait(timeouts.transport_state, || {
                EngineError::TransportTimedOut("publisher transport didn't connect".to_owned())
            })
            .await?;
    }

    check_should_continue(shared)?;
    shared.signal.send_queued_requests().await?;

    Ok(())
}

/// Tear down all RTC state and re-run the initial connect sequence
/// against the same URL and token. Returns the new session generation.
async fn full_reconnect_sequence(
    shared: &EngineShared,
    ctx: &ReconnectContext,
) -> Result<u64, EngineError> {
    check_should_continue(shared)?;

    let new_generation = actor_roundtrip(shared, |reply| EngineMsg::CleanUpRtc {
        generation: ctx.generation,
        reply,
    })
    .await??;

    full_connect_sequence(
        shared,
        new_generation,
        &ctx.url,
        &ctx.token,
        SignalingMode::Reconnect(ReconnectMode::Full),
    )
    .await?;

    Ok(new_generation)
}
