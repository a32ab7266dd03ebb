// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! The WebSocket signaling client.
//!
//! One protobuf envelope per binary frame. Inbound frames other than
//! the join response are buffered until the engine calls
//! [`SignalClient::resume_response_queue`], which is what lets the
//! engine configure its transports before any offer or trickle frame is
//! processed. Outbound requests that allow it are queued while the
//! socket is down and flushed by
//! [`SignalClient::send_queued_requests`].

use super::{SignalClient, SignalConnectionState, SignalEvent, SignalOptions, SignalingMode};
use crate::error::EngineError;
use crate::rtc::IceCandidate;
use crate::state::DisconnectReason;
use crate::utils::Completer;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use roomrtc_proto::{
    AddTrackRequest, JoinResponse, LeaveRequest, Message as _, SessionDescription, SignalRequest,
    SignalResponse, SignalTarget, TrackInfo, TrickleRequest, signal_request, signal_response,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

const LOG_TARGET: &str = "roomrtc-signal";

/// A [`SignalClient`] over a WebSocket.
pub struct WsSignalClient {
    shared: Arc<WsShared>,
}

struct WsShared {
    join: Completer<JoinResponse>,
    listener: Mutex<Option<mpsc::UnboundedSender<SignalEvent>>>,
    track_completers: Mutex<HashMap<String, Completer<TrackInfo>>>,
    inner: Mutex<Inner>,
}

struct Inner {
    writer: Option<mpsc::UnboundedSender<WsMessage>>,
    queue: Vec<SignalRequest>,
    buffered: Vec<signal_response::Message>,
    suspended: bool,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    generation: u64,
}

impl WsSignalClient {
    /// Create a client with no socket yet.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(WsShared {
                join: Completer::new(),
                listener: Mutex::new(None),
                track_completers: Mutex::new(HashMap::new()),
                inner: Mutex::new(Inner {
                    writer: None,
                    queue: Vec::new(),
                    buffered: Vec::new(),
                    suspended: false,
                    tasks: Vec::new(),
                    generation: 0,
                }),
            }),
        }
    }
}

impl Default for WsSignalClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the `/rtc` connect URL, normalizing `http(s)` schemes to
/// `ws(s)`.
fn build_url(
    url: &str,
    token: &str,
    options: SignalOptions,
    mode: SignalingMode,
) -> Result<Url, EngineError> {
    let mut parsed =
        Url::parse(url).map_err(|error| EngineError::Websocket(format!("invalid url: {error}")))?;

    let scheme = match parsed.scheme() {
        "ws" | "wss" => None,
        "http" => Some("ws"),
        "https" => Some("wss"),
        other => {
            return Err(EngineError::Websocket(format!(
                "unsupported url scheme: {other}"
            )));
        }
    };
    if let Some(scheme) = scheme {
        parsed
            .set_scheme(scheme)
            .map_err(|()| EngineError::Websocket("failed to normalize url scheme".to_owned()))?;
    }

    parsed
        .path_segments_mut()
        .map_err(|()| EngineError::Websocket("url cannot be a base".to_owned()))?
        .pop_if_empty()
        .push("rtc");

    parsed
        .query_pairs_mut()
        .append_pair("access_token", token)
        .append_pair(
            "auto_subscribe",
            if options.auto_subscribe { "1" } else { "0" },
        );
    if mode.is_reconnect() {
        parsed.query_pairs_mut().append_pair("reconnect", "1");
    }

    Ok(parsed)
}

impl WsShared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: SignalEvent) {
        let listener = match self.listener.lock() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(_) => None,
        };
        if let Some(listener) = listener {
            let _ = listener.send(event);
        }
    }

    /// Handle one inbound frame from the reader task.
    fn handle_frame(&self, generation: u64, bytes: &[u8]) {
        let response = match SignalResponse::decode(bytes) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(target: LOG_TARGET, %error, "failed to decode signal frame");
                return;
            }
        };
        let Some(message) = response.message else {
            tracing::debug!(target: LOG_TARGET, "ignoring empty signal frame");
            return;
        };

        {
            let inner = self.inner();
            if inner.generation != generation {
                // A clean up or reconnect already replaced this socket.
                return;
            }
        }

        // The join frame always passes straight through to its
        // completer; everything else respects the response queue.
        if let signal_response::Message::Join(join) = message {
            tracing::debug!(target: LOG_TARGET, "received join response");
            self.join.set(Some(join));
            return;
        }

        {
            let mut inner = self.inner();
            if inner.suspended {
                inner.buffered.push(message);
                return;
            }
        }

        self.deliver(message);
    }

    /// Deliver a (non-join) inbound message to the listener or to the
    /// matching track completer.
    fn deliver(&self, message: signal_response::Message) {
        match message {
            signal_response::Message::Join(_) => {}
            signal_response::Message::Answer(answer) => self.emit(SignalEvent::Answer(answer)),
            signal_response::Message::Offer(offer) => self.emit(SignalEvent::Offer(offer)),
            signal_response::Message::Trickle(trickle) => {
                let target = trickle.target();
                match IceCandidate::from_json(&trickle.candidate_init) {
                    Ok(candidate) => self.emit(SignalEvent::Trickle { candidate, target }),
                    Err(error) => {
                        tracing::warn!(target: LOG_TARGET, %error, "failed to parse trickled candidate");
                    }
                }
            }
            signal_response::Message::TrackPublished(published) => {
                let completer = {
                    match self.track_completers.lock() {
                        Ok(mut guard) => guard.remove(&published.cid),
                        Err(_) => None,
                    }
                };
                match (completer, published.track) {
                    (Some(completer), Some(track)) => completer.set(Some(track)),
                    (completer, _) => {
                        tracing::warn!(
                            target: LOG_TARGET,
                            cid = %published.cid,
                            unexpected = completer.is_none(),
                            "dropping unusable track published response",
                        );
                    }
                }
            }
            signal_response::Message::Leave(leave) => self.emit(SignalEvent::Leave {
                can_reconnect: leave.can_reconnect,
            }),
            signal_response::Message::RefreshToken(token) => {
                self.emit(SignalEvent::RefreshToken(token));
            }
        }
    }

    /// The socket dropped out from under us.
    fn socket_lost(&self, generation: u64, reason: String) {
        {
            let mut inner = self.inner();
            if inner.generation != generation {
                // An intentional clean up or reconnect already
                // replaced this socket.
                return;
            }
            inner.writer = None;
        }
        tracing::warn!(target: LOG_TARGET, %reason, "signaling socket lost");
        self.emit(SignalEvent::ConnectionState(
            SignalConnectionState::Disconnected(DisconnectReason::Network(Some(reason))),
        ));
    }

    /// Encode and submit a request, or queue it when allowed and the
    /// socket is down.
    fn send_request(&self, request: SignalRequest, queue_if_down: bool) -> Result<(), EngineError> {
        let mut inner = self.inner();

        let sent = if let Some(writer) = &inner.writer {
            writer
                .send(WsMessage::binary(request.encode_to_vec()))
                .is_ok()
        } else {
            false
        };

        if sent {
            return Ok(());
        }
        if queue_if_down {
            tracing::debug!(target: LOG_TARGET, "socket down, queueing request");
            inner.queue.push(request);
            return Ok(());
        }
        Err(EngineError::Websocket(
            "signaling socket is not connected".to_owned(),
        ))
    }
}

#[async_trait]
impl SignalClient for WsSignalClient {
    fn attach_listener(&self, events: mpsc::UnboundedSender<SignalEvent>) {
        if let Ok(mut listener) = self.shared.listener.lock() {
            *listener = Some(events);
        }
    }

    async fn connect(
        &self,
        url: &str,
        token: &str,
        options: SignalOptions,
        mode: SignalingMode,
    ) -> Result<(), EngineError> {
        let connect_url = build_url(url, token, options, mode)?;
        tracing::debug!(target: LOG_TARGET, %connect_url, ?mode, "connecting signaling socket");

        let (stream, _response) = tokio_tungstenite::connect_async(connect_url.as_str())
            .await
            .map_err(|error| EngineError::Websocket(error.to_string()))?;
        let (mut sink, mut source) = stream.split();

        // A fresh or full connect starts a new session: rearm the join
        // completer and gate inbound frames until the engine resumes
        // them. A quick resume keeps the session flowing.
        let fresh_session = mode != SignalingMode::Reconnect(crate::state::ReconnectMode::Quick);
        if fresh_session {
            self.shared.join.reset();
        }

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WsMessage>();

        let generation = {
            let mut inner = self.shared.inner();
            for task in inner.tasks.drain(..) {
                task.abort();
            }
            inner.generation += 1;
            inner.writer = Some(writer_tx);
            inner.buffered.clear();
            inner.suspended = fresh_session;
            inner.generation
        };

        let writer_task = tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let shared = self.shared.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(WsMessage::Binary(data))) => shared.handle_frame(generation, &data),
                    Some(Ok(WsMessage::Close(_))) => {
                        shared.socket_lost(generation, "closed by server".to_owned());
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        shared.socket_lost(generation, error.to_string());
                        break;
                    }
                    None => {
                        shared.socket_lost(generation, "stream ended".to_owned());
                        break;
                    }
                }
            }
        });

        {
            let mut inner = self.shared.inner();
            inner.tasks.push(writer_task);
            inner.tasks.push(reader_task);
        }

        self.shared
            .emit(SignalEvent::ConnectionState(SignalConnectionState::Connected));

        Ok(())
    }

    async fn clean_up(&self, reason: DisconnectReason) {
        tracing::debug!(target: LOG_TARGET, ?reason, "cleaning up signaling socket");

        {
            let mut inner = self.shared.inner();
            for task in inner.tasks.drain(..) {
                task.abort();
            }
            inner.generation += 1;
            inner.writer = None;
            inner.queue.clear();
            inner.buffered.clear();
            inner.suspended = false;
        }

        self.shared.join.reset();

        let completers: Vec<Completer<TrackInfo>> = match self.shared.track_completers.lock() {
            Ok(mut guard) => guard.drain().map(|(_, completer)| completer).collect(),
            Err(_) => Vec::new(),
        };
        for completer in completers {
            completer.reset();
        }
    }

    fn join_response(&self) -> Completer<JoinResponse> {
        self.shared.join.clone()
    }

    fn resume_response_queue(&self) {
        let buffered = {
            let mut inner = self.shared.inner();
            inner.suspended = false;
            std::mem::take(&mut inner.buffered)
        };

        for message in buffered {
            self.shared.deliver(message);
        }
    }

    async fn send_offer(&self, offer: SessionDescription) -> Result<(), EngineError> {
        self.shared.send_request(
            SignalRequest {
                message: Some(signal_request::Message::Offer(offer)),
            },
            false,
        )
    }

    async fn send_answer(&self, answer: SessionDescription) -> Result<(), EngineError> {
        self.shared.send_request(
            SignalRequest {
                message: Some(signal_request::Message::Answer(answer)),
            },
            false,
        )
    }

    async fn send_candidate(
        &self,
        candidate: IceCandidate,
        target: SignalTarget,
    ) -> Result<(), EngineError> {
        let trickle = TrickleRequest {
            candidate_init: candidate.to_json()?,
            target: target as i32,
        };
        self.shared.send_request(
            SignalRequest {
                message: Some(signal_request::Message::Trickle(trickle)),
            },
            false,
        )
    }

    async fn send_add_track(&self, request: AddTrackRequest) -> Result<(), EngineError> {
        self.shared.send_request(
            SignalRequest {
                message: Some(signal_request::Message::AddTrack(request)),
            },
            true,
        )
    }

    async fn send_leave(&self) -> Result<(), EngineError> {
        self.shared.send_request(
            SignalRequest {
                message: Some(signal_request::Message::Leave(LeaveRequest {
                    can_reconnect: false,
                })),
            },
            false,
        )
    }

    async fn send_queued_requests(&self) -> Result<(), EngineError> {
        let queued = {
            let mut inner = self.shared.inner();
            std::mem::take(&mut inner.queue)
        };

        if queued.is_empty() {
            return Ok(());
        }

        tracing::debug!(target: LOG_TARGET, count = queued.len(), "flushing queued requests");
        for request in queued {
            self.shared.send_request(request, false)?;
        }
        Ok(())
    }

    fn prepare_track_completer(&self, cid: &str) -> Completer<TrackInfo> {
        let completer = Completer::new();
        if let Ok(mut guard) = self.shared.track_completers.lock() {
            guard.insert(cid.to_owned(), completer.clone());
        }
        completer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ReconnectMode;
    use futures::{SinkExt, StreamExt};
    use roomrtc_proto::IceServer;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn join_frame() -> Vec<u8> {
        SignalResponse {
            message: Some(signal_response::Message::Join(JoinResponse {
                ice_servers: vec![IceServer {
                    urls: vec!["stun:stun.example.com".to_owned()],
                    username: String::new(),
                    credential: String::new(),
                }],
                subscriber_primary: true,
                room_sid: "RM_1".to_owned(),
                participant_sid: "PA_1".to_owned(),
            })),
        }
        .encode_to_vec()
    }

    fn offer_frame() -> Vec<u8> {
        SignalResponse {
            message: Some(signal_response::Message::Offer(SessionDescription::offer(
                "v=0 test",
            ))),
        }
        .encode_to_vec()
    }

    /// A one-connection server that sends `frames` on accept, forwards
    /// every inbound binary frame to the returned receiver, and drops
    /// the connection when the returned sender fires.
    async fn run_server(
        frames: Vec<Vec<u8>>,
    ) -> (
        String,
        mpsc::UnboundedReceiver<SignalRequest>,
        tokio::sync::oneshot::Sender<()>,
    ) {
        let _ = tracing_subscriber::fmt::try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

            for frame in frames {
                ws.send(WsMessage::binary(frame)).await.unwrap();
            }

            loop {
                tokio::select! {
                    message = ws.next() => match message {
                        Some(Ok(WsMessage::Binary(data))) => {
                            let request = SignalRequest::decode(&data[..]).unwrap();
                            if inbound_tx.send(request).is_err() {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                    _ = &mut close_rx => break,
                }
            }
        });

        (format!("ws://{addr}"), inbound_rx, close_tx)
    }

    fn options() -> SignalOptions {
        SignalOptions {
            auto_subscribe: true,
        }
    }

    #[tokio::test]
    async fn join_resolves_and_other_frames_buffer_until_resume() {
        let (url, _inbound, _close) = run_server(vec![join_frame(), offer_frame()]).await;

        let client = WsSignalClient::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        client.attach_listener(events_tx);

        client
            .connect(&url, "tok", options(), SignalingMode::Fresh)
            .await
            .unwrap();

        let join = client
            .join_response()
            .wait(Duration::from_secs(5), || {
                EngineError::SignalTimedOut("no join".to_owned())
            })
            .await
            .unwrap();
        assert!(join.subscriber_primary);

        // The offer frame is buffered: nothing but the connected event
        // has been delivered.
        assert!(matches!(
            events_rx.recv().await,
            Some(SignalEvent::ConnectionState(SignalConnectionState::Connected))
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events_rx.try_recv().is_err());

        client.resume_response_queue();
        assert!(matches!(events_rx.recv().await, Some(SignalEvent::Offer(_))));

        client.clean_up(DisconnectReason::Sdk).await;
    }

    #[tokio::test]
    async fn queued_requests_flush_after_reconnect() {
        let client = WsSignalClient::new();

        // Socket is down: an add-track request queues instead of
        // failing.
        client
            .send_add_track(AddTrackRequest {
                cid: "cid-1".to_owned(),
                ..Default::default()
            })
            .await
            .unwrap();

        // Offers are connection-specific and must not queue.
        let err = client
            .send_offer(SessionDescription::offer("v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Websocket(_)));

        let (url, mut inbound, _close) = run_server(vec![join_frame()]).await;
        client
            .connect(&url, "tok", options(), SignalingMode::Reconnect(ReconnectMode::Quick))
            .await
            .unwrap();

        client.send_queued_requests().await.unwrap();

        let request = inbound.recv().await.unwrap();
        match request.message {
            Some(signal_request::Message::AddTrack(add_track)) => {
                assert_eq!(add_track.cid, "cid-1");
            }
            other => panic!("expected queued add track request, got {other:?}"),
        }

        client.clean_up(DisconnectReason::Sdk).await;
    }

    #[tokio::test]
    async fn socket_loss_emits_network_disconnect() {
        let (url, _inbound, close) = run_server(vec![join_frame()]).await;

        let client = WsSignalClient::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        client.attach_listener(events_tx);

        client
            .connect(&url, "tok", options(), SignalingMode::Fresh)
            .await
            .unwrap();
        assert!(matches!(
            events_rx.recv().await,
            Some(SignalEvent::ConnectionState(SignalConnectionState::Connected))
        ));

        // Closing the server side tears the socket down under the
        // client.
        let _ = close.send(());

        loop {
            match events_rx.recv().await {
                Some(SignalEvent::ConnectionState(SignalConnectionState::Disconnected(
                    DisconnectReason::Network(_),
                ))) => break,
                Some(_) => continue,
                None => panic!("listener closed without a disconnect event"),
            }
        }

        // Idempotent.
        client.clean_up(DisconnectReason::Sdk).await;
        client.clean_up(DisconnectReason::Sdk).await;
    }

    #[test]
    fn build_url_normalizes_scheme_and_appends_query() {
        let url = build_url(
            "https://rtc.example.com",
            "tok",
            options(),
            SignalingMode::Reconnect(ReconnectMode::Quick),
        )
        .unwrap();

        assert_eq!(url.scheme(), "wss");
        assert!(url.path().ends_with("/rtc"));
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("access_token".to_owned(), "tok".to_owned())));
        assert!(query.contains(&("auto_subscribe".to_owned(), "1".to_owned())));
        assert!(query.contains(&("reconnect".to_owned(), "1".to_owned())));
    }

    #[test]
    fn build_url_rejects_unsupported_schemes() {
        let err = build_url("ftp://example.com", "tok", options(), SignalingMode::Fresh)
            .unwrap_err();
        assert!(matches!(err, EngineError::Websocket(_)));
    }
}
