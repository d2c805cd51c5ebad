//! Shared test doubles: a scripted WebRTC engine, a recording signaling
//! sender, and a recording observer.
#![allow(dead_code)]

use async_trait::async_trait;
use peermedia_p2p::{
    ChannelConfig, ChannelObserver, ConnectionStats, DataChannel, DataChannelState, EngineEvent,
    IceCandidate, MediaStreamHandle, OnFailure, OnSuccess, P2pError, PeerChannel, PeerEngine,
    RemoteStream, SdpType, SessionDescription, SignalingSender, SignalingState,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared cross-mock call log, used to assert ordering between signaling
/// emissions and engine calls.
pub type Ledger = Arc<Mutex<Vec<String>>>;

pub struct MockDataChannel {
    label: String,
    state: Mutex<DataChannelState>,
    pub sent: Mutex<Vec<String>>,
}

impl MockDataChannel {
    pub fn new(label: &str) -> Self {
        MockDataChannel {
            label: label.to_string(),
            state: Mutex::new(DataChannelState::Connecting),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: DataChannelState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl DataChannel for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> DataChannelState {
        *self.state.lock().unwrap()
    }

    fn send(&self, message: &str) -> peermedia_p2p::Result<()> {
        if self.state() != DataChannelState::Open {
            return Err(P2pError::invalid_state("data channel is not open"));
        }
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Scripted engine: records every call on the ledger and plays back the
/// callback sequence a real engine would produce.
pub struct MockEngine {
    events: mpsc::UnboundedSender<EngineEvent>,
    signaling_state: Mutex<SignalingState>,
    auto_sdp: AtomicBool,
    pub ledger: Ledger,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    pub data_channels: Mutex<Vec<Arc<MockDataChannel>>>,
}

impl MockEngine {
    pub fn new(events: mpsc::UnboundedSender<EngineEvent>, ledger: Ledger) -> Self {
        MockEngine {
            events,
            signaling_state: Mutex::new(SignalingState::Stable),
            auto_sdp: AtomicBool::new(true),
            ledger,
            remote_descriptions: Mutex::new(Vec::new()),
            data_channels: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_signaling_state(&self, state: SignalingState) {
        *self.signaling_state.lock().unwrap() = state;
    }

    /// Disable automatic SDP completion so tests can hold offers in flight.
    pub fn hold_sdp(&self) {
        self.auto_sdp.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.ledger
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with("engine:"))
            .cloned()
            .collect()
    }

    pub fn count_call(&self, name: &str) -> usize {
        let needle = format!("engine:{name}");
        self.ledger
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with(&needle))
            .count()
    }

    fn record(&self, entry: String) {
        self.ledger.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl PeerEngine for MockEngine {
    async fn initialize_peer_connection(&self) -> peermedia_p2p::Result<()> {
        self.record("engine:initialize".into());
        self.set_signaling_state(SignalingState::Stable);
        Ok(())
    }

    async fn create_offer(&self) {
        self.record("engine:create_offer".into());
        if self.auto_sdp.load(Ordering::SeqCst) {
            self.emit(EngineEvent::SdpCreated(SessionDescription {
                kind: SdpType::Offer,
                sdp: "v=0 mock offer".to_string(),
            }));
        }
    }

    async fn create_answer(&self) {
        self.record("engine:create_answer".into());
        if self.auto_sdp.load(Ordering::SeqCst) {
            self.emit(EngineEvent::SdpCreated(SessionDescription {
                kind: SdpType::Answer,
                sdp: "v=0 mock answer".to_string(),
            }));
        }
    }

    async fn set_local_description(&self, description: SessionDescription) {
        self.record(format!("engine:set_local:{}", description.kind));
        match description.kind {
            SdpType::Offer => self.set_signaling_state(SignalingState::HaveLocalOffer),
            SdpType::Answer => self.set_signaling_state(SignalingState::Stable),
        }
        self.emit(EngineEvent::LocalSdpApplied);
        if description.kind == SdpType::Answer {
            self.emit(EngineEvent::SignalingStateChanged(SignalingState::Stable));
        }
    }

    async fn set_remote_description(&self, description: SessionDescription) {
        self.record(format!("engine:set_remote:{}", description.kind));
        match description.kind {
            SdpType::Offer => self.set_signaling_state(SignalingState::HaveRemoteOffer),
            SdpType::Answer => self.set_signaling_state(SignalingState::Stable),
        }
        let kind = description.kind;
        self.remote_descriptions.lock().unwrap().push(description);
        self.emit(EngineEvent::RemoteSdpApplied);
        if kind == SdpType::Answer {
            self.emit(EngineEvent::SignalingStateChanged(SignalingState::Stable));
        }
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) {
        self.record(format!("engine:add_candidate:{}", candidate.candidate));
    }

    async fn add_stream(&self, stream: MediaStreamHandle) {
        self.record(format!("engine:add_stream:{}", stream.label()));
    }

    async fn remove_stream(&self, stream: MediaStreamHandle) {
        self.record(format!("engine:remove_stream:{}", stream.label()));
    }

    async fn create_data_channel(&self, label: &str) {
        self.record(format!("engine:create_data_channel:{label}"));
        let channel = Arc::new(MockDataChannel::new(label));
        self.data_channels.lock().unwrap().push(channel.clone());
        self.emit(EngineEvent::DataChannel(channel));
        // Adding a channel makes a real engine ask for a negotiation round.
        self.emit(EngineEvent::RenegotiationNeeded);
    }

    async fn close_peer_connection(&self) {
        self.record("engine:close".into());
        self.set_signaling_state(SignalingState::Closed);
        self.emit(EngineEvent::IceConnectionStateChanged(
            peermedia_p2p::IceConnectionState::Closed,
        ));
    }

    async fn get_stats(&self) -> peermedia_p2p::Result<ConnectionStats> {
        self.record("engine:get_stats".into());
        Ok(ConnectionStats {
            bytes_sent: 1234,
            bytes_received: 4321,
            packets_lost: 2,
            round_trip_time_ms: Some(40),
        })
    }

    async fn apply_bitrate_settings(
        &self,
        _max_audio_bitrate: Option<u32>,
        _max_video_bitrate: Option<u32>,
    ) {
        self.record("engine:apply_bitrate".into());
    }

    fn signaling_state(&self) -> SignalingState {
        *self.signaling_state.lock().unwrap()
    }
}

/// Recording signaling sender; parses every outbound envelope.
#[derive(Clone)]
pub struct MockSignaling {
    pub sent: Arc<Mutex<Vec<Value>>>,
    pub fail_with: Arc<Mutex<Option<i32>>>,
    ledger: Ledger,
}

impl MockSignaling {
    pub fn new(ledger: Ledger) -> Self {
        MockSignaling {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_with: Arc::new(Mutex::new(None)),
            ledger,
        }
    }

    pub fn fail_sends(&self, code: i32) {
        *self.fail_with.lock().unwrap() = Some(code);
    }

    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|envelope| envelope["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.sent_kinds().iter().filter(|k| *k == kind).count()
    }

    pub fn last_of_kind(&self, kind: &str) -> Option<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|envelope| envelope["type"] == kind)
            .cloned()
    }
}

#[async_trait]
impl SignalingSender for MockSignaling {
    async fn send(&self, message: &str, _remote_id: &str) -> Result<(), i32> {
        if let Some(code) = *self.fail_with.lock().unwrap() {
            return Err(code);
        }
        let envelope: Value = serde_json::from_str(message).expect("outbound message is JSON");
        if let Some(kind) = envelope["type"].as_str() {
            self.ledger.lock().unwrap().push(format!("signal:{kind}"));
        }
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }
}

/// Observer that records every callback as a flat string.
#[derive(Default)]
pub struct RecordingObserver {
    pub log: Mutex<Vec<String>>,
    pub added_streams: Mutex<Vec<RemoteStream>>,
}

impl RecordingObserver {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl ChannelObserver for RecordingObserver {
    fn on_invited(&self, remote_id: &str) {
        self.record(format!("invited:{remote_id}"));
    }
    fn on_accepted(&self, remote_id: &str) {
        self.record(format!("accepted:{remote_id}"));
    }
    fn on_denied(&self, remote_id: &str) {
        self.record(format!("denied:{remote_id}"));
    }
    fn on_started(&self, remote_id: &str) {
        self.record(format!("started:{remote_id}"));
    }
    fn on_stopped(&self, remote_id: &str) {
        self.record(format!("stopped:{remote_id}"));
    }
    fn on_data(&self, _remote_id: &str, message: &str) {
        self.record(format!("data:{message}"));
    }
    fn on_stream_added(&self, stream: RemoteStream) {
        self.record(format!("stream_added:{}", stream.media().label()));
        self.added_streams.lock().unwrap().push(stream);
    }
    fn on_stream_removed(&self, stream: RemoteStream) {
        self.record(format!("stream_removed:{}", stream.media().label()));
    }
}

/// Everything a scenario needs, wired together.
pub struct TestRig {
    pub channel: Arc<PeerChannel>,
    pub engine: Arc<MockEngine>,
    pub signaling: MockSignaling,
    pub observer: Arc<RecordingObserver>,
    pub ledger: Ledger,
}

pub fn rig(local_id: &str, remote_id: &str) -> TestRig {
    rig_with(local_id, remote_id, ChannelConfig::default())
}

pub fn rig_with(local_id: &str, remote_id: &str, config: ChannelConfig) -> TestRig {
    let ledger: Ledger = Arc::new(Mutex::new(Vec::new()));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let engine = Arc::new(MockEngine::new(events_tx, ledger.clone()));
    let signaling = MockSignaling::new(ledger.clone());
    let observer = Arc::new(RecordingObserver::default());
    let channel = PeerChannel::new(
        config,
        local_id,
        remote_id,
        Box::new(signaling.clone()),
        engine.clone(),
        events_rx,
    );
    let registered: Arc<dyn ChannelObserver> = observer.clone();
    channel.add_observer(registered);
    TestRig {
        channel,
        engine,
        signaling,
        observer,
        ledger,
    }
}

/// Poll a predicate until it holds or two seconds elapse.
pub async fn wait_until(description: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not met within 2s: {description}");
}

// ---- inbound message builders ----

pub fn user_agent_json(runtime: &str) -> Value {
    json!({
        "sdk": {"type": "rust", "version": "0.4.0"},
        "runtime": {"name": runtime, "version": "100"}
    })
}

pub fn invitation_from(runtime: &str) -> String {
    json!({"type": "chat-invitation", "data": {"ua": user_agent_json(runtime)}}).to_string()
}

pub fn acceptance_from(runtime: &str) -> String {
    json!({"type": "chat-accepted", "data": {"ua": user_agent_json(runtime)}}).to_string()
}

pub fn signal_offer(sdp: &str) -> String {
    json!({"type": "chat-signal", "data": {"type": "offer", "sdp": sdp}}).to_string()
}

pub fn signal_answer(sdp: &str) -> String {
    json!({"type": "chat-signal", "data": {"type": "answer", "sdp": sdp}}).to_string()
}

pub fn signal_candidate(candidate: &str) -> String {
    json!({
        "type": "chat-signal",
        "data": {"type": "candidates", "sdpMid": "0", "sdpMLineIndex": 0, "candidate": candidate}
    })
    .to_string()
}

pub fn track_sources(entries: &[(&str, &str)]) -> String {
    let data: Vec<Value> = entries
        .iter()
        .map(|(id, source)| json!({"id": id, "source": source}))
        .collect();
    json!({"type": "chat-track-sources", "data": data}).to_string()
}

// ---- completion probes ----

pub fn success_probe() -> (OnSuccess, std_mpsc::Receiver<()>) {
    let (tx, rx) = std_mpsc::channel();
    (
        Box::new(move || {
            let _ = tx.send(());
        }),
        rx,
    )
}

pub fn failure_probe() -> (OnFailure, std_mpsc::Receiver<P2pError>) {
    let (tx, rx) = std_mpsc::channel();
    (
        Box::new(move |error| {
            let _ = tx.send(error);
        }),
        rx,
    )
}

pub fn expect_failure(rx: &std_mpsc::Receiver<P2pError>) -> P2pError {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("expected a failure callback")
}

pub fn expect_success(rx: &std_mpsc::Receiver<()>) {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("expected a success callback")
}

// ---- scenario helpers ----

/// Drive the channel through the callee handshake until `Connected`.
pub async fn connect_as_callee(rig: &TestRig, remote_runtime: &str) {
    rig.channel
        .on_incoming_signaling_message(&invitation_from(remote_runtime))
        .await;
    rig.channel.accept(None, None).await;
    rig.channel
        .on_incoming_signaling_message(&signal_offer("v=0 remote offer"))
        .await;
    wait_until("answer emitted", || {
        rig.signaling
            .last_of_kind("chat-signal")
            .map(|signal| signal["data"]["type"] == "answer")
            .unwrap_or(false)
    })
    .await;
    rig.engine.emit(EngineEvent::IceConnectionStateChanged(
        peermedia_p2p::IceConnectionState::Connected,
    ));
    let channel = rig.channel.clone();
    wait_until("session connected", move || {
        channel.session_state() == peermedia_p2p::SessionState::Connected
    })
    .await;
}

/// Drive the channel through the caller handshake until `Connected`.
pub async fn connect_as_caller(rig: &TestRig, remote_runtime: &str) {
    rig.channel.invite(None, None).await;
    rig.channel
        .on_incoming_signaling_message(&acceptance_from(remote_runtime))
        .await;
    wait_until("offer emitted", || {
        rig.signaling.count_kind("chat-signal") > 0
    })
    .await;
    rig.channel
        .on_incoming_signaling_message(&signal_answer("v=0 remote answer"))
        .await;
    rig.engine.emit(EngineEvent::IceConnectionStateChanged(
        peermedia_p2p::IceConnectionState::Connected,
    ));
    let channel = rig.channel.clone();
    wait_until("session connected", move || {
        channel.session_state() == peermedia_p2p::SessionState::Connected
    })
    .await;
}
