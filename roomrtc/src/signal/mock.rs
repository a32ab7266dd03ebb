// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A programmable signal client for testing engine behavior.

use super::{SignalClient, SignalEvent, SignalOptions, SignalingMode};
use crate::error::EngineError;
use crate::rtc::IceCandidate;
use crate::state::{DisconnectReason, ReconnectMode};
use crate::utils::Completer;
use async_trait::async_trait;
use roomrtc_proto::{AddTrackRequest, JoinResponse, SessionDescription, SignalTarget, TrackInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

/// One recorded call to [`SignalClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    /// The URL passed in.
    pub url: String,
    /// The token passed in.
    pub token: String,
    /// The connect mode.
    pub mode: SignalingMode,
}

#[derive(Default)]
struct State {
    scripted_join: Option<JoinResponse>,
    join_delay: Duration,
    fail_connects: u32,
    connects: Vec<ConnectRecord>,
    clean_ups: Vec<DisconnectReason>,
    offers: Vec<SessionDescription>,
    answers: Vec<SessionDescription>,
    candidates: Vec<(IceCandidate, SignalTarget)>,
    add_tracks: Vec<AddTrackRequest>,
    leaves: u32,
    queued_flushes: u32,
    resumes: u32,
    track_responses: HashMap<String, TrackInfo>,
    track_completers: HashMap<String, Completer<TrackInfo>>,
}

/// A scriptable, recording [`SignalClient`].
///
/// Scripted join responses resolve the join completer a configurable
/// delay after each fresh or full connect; every outbound request is
/// recorded for inspection; inbound events are triggered with
/// [`MockSignalClient::emit`].
pub struct MockSignalClient {
    join: Completer<JoinResponse>,
    listener: Mutex<Option<mpsc::UnboundedSender<SignalEvent>>>,
    state: Arc<Mutex<State>>,
}

impl MockSignalClient {
    /// Create a client with nothing scripted.
    pub fn new() -> Self {
        Self {
            join: Completer::new(),
            listener: Mutex::new(None),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Resolve the join completer with `join`, `delay` after each fresh
    /// or full connect.
    pub fn script_join(&self, join: JoinResponse, delay: Duration) {
        let mut state = self.state();
        state.scripted_join = Some(join);
        state.join_delay = delay;
    }

    /// Fail the next `count` connect calls with a network error.
    pub fn fail_next_connects(&self, count: u32) {
        self.state().fail_connects = count;
    }

    /// Script the track info resolved when an add-track request for
    /// `cid` is sent.
    pub fn script_track_response(&self, cid: &str, info: TrackInfo) {
        self.state().track_responses.insert(cid.to_owned(), info);
    }

    /// Deliver an event to the engine, as if it arrived from the
    /// server.
    pub fn emit(&self, event: SignalEvent) {
        let listener = match self.listener.lock() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(_) => None,
        };
        if let Some(listener) = listener {
            let _ = listener.send(event);
        }
    }

    /// All recorded connect calls, in order.
    pub fn connects(&self) -> Vec<ConnectRecord> {
        self.state().connects.clone()
    }

    /// All recorded clean-up reasons, in order.
    pub fn clean_ups(&self) -> Vec<DisconnectReason> {
        self.state().clean_ups.clone()
    }

    /// All offers sent by the engine.
    pub fn sent_offers(&self) -> Vec<SessionDescription> {
        self.state().offers.clone()
    }

    /// All answers sent by the engine.
    pub fn sent_answers(&self) -> Vec<SessionDescription> {
        self.state().answers.clone()
    }

    /// All trickled candidates sent by the engine.
    pub fn sent_candidates(&self) -> Vec<(IceCandidate, SignalTarget)> {
        self.state().candidates.clone()
    }

    /// All add-track requests sent by the engine.
    pub fn sent_add_tracks(&self) -> Vec<AddTrackRequest> {
        self.state().add_tracks.clone()
    }

    /// How many times queued requests were flushed.
    pub fn queued_flush_count(&self) -> u32 {
        self.state().queued_flushes
    }

    /// How many leave requests were sent.
    pub fn leave_count(&self) -> u32 {
        self.state().leaves
    }

    /// How many times the response queue was resumed.
    pub fn resume_count(&self) -> u32 {
        self.state().resumes
    }
}

impl Default for MockSignalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalClient for MockSignalClient {
    fn attach_listener(&self, events: mpsc::UnboundedSender<SignalEvent>) {
        if let Ok(mut listener) = self.listener.lock() {
            *listener = Some(events);
        }
    }

    async fn connect(
        &self,
        url: &str,
        token: &str,
        _options: SignalOptions,
        mode: SignalingMode,
    ) -> Result<(), EngineError> {
        let (scripted, delay) = {
            let mut state = self.state();
            state.connects.push(ConnectRecord {
                url: url.to_owned(),
                token: token.to_owned(),
                mode,
            });
            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(EngineError::Network("connection refused".to_owned()));
            }
            (state.scripted_join.clone(), state.join_delay)
        };

        // A quick resume keeps the current session; anything else
        // starts a new one and gets a new join frame.
        if mode != SignalingMode::Reconnect(ReconnectMode::Quick) {
            self.join.reset();
            if let Some(join) = scripted {
                let completer = self.join.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    completer.set(Some(join));
                });
            }
        }

        Ok(())
    }

    async fn clean_up(&self, reason: DisconnectReason) {
        self.state().clean_ups.push(reason);
        self.join.reset();
    }

    fn join_response(&self) -> Completer<JoinResponse> {
        self.join.clone()
    }

    fn resume_response_queue(&self) {
        self.state().resumes += 1;
    }

    async fn send_offer(&self, offer: SessionDescription) -> Result<(), EngineError> {
        self.state().offers.push(offer);
        Ok(())
    }

    async fn send_answer(&self, answer: SessionDescription) -> Result<(), EngineError> {
        self.state().answers.push(answer);
        Ok(())
    }

    async fn send_candidate(
        &self,
        candidate: IceCandidate,
        target: SignalTarget,
    ) -> Result<(), EngineError> {
        self.state().candidates.push((candidate, target));
        Ok(())
    }

    async fn send_add_track(&self, request: AddTrackRequest) -> Result<(), EngineError> {
        let (completer, info) = {
            let mut state = self.state();
            let completer = state.track_completers.remove(&request.cid);
            let info = state.track_responses.get(&request.cid).cloned();
            state.add_tracks.push(request);
            (completer, info)
        };

        // Scripted responses resolve immediately, as if the server
        // answered.
        if let (Some(completer), Some(info)) = (completer, info) {
            completer.set(Some(info));
        }

        Ok(())
    }

    async fn send_leave(&self) -> Result<(), EngineError> {
        self.state().leaves += 1;
        Ok(())
    }

    async fn send_queued_requests(&self) -> Result<(), EngineError> {
        self.state().queued_flushes += 1;
        Ok(())
    }

    fn prepare_track_completer(&self, cid: &str) -> Completer<TrackInfo> {
        let completer = Completer::new();
        self.state()
            .track_completers
            .insert(cid.to_owned(), completer.clone());
        completer
    }
}
