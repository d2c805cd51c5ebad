//! Per-peer session control
//!
//! A [`PeerChannel`] owns the whole lifecycle of one WebRTC session with one
//! remote identity: the invitation handshake over signaling, offer/answer
//! and ICE progress through the engine, stream publication, and the text
//! data channel.
//!
//! # Concurrency
//!
//! Inputs arrive from four directions: the caller's API, the signaling
//! delivery task, the engine's event stream, and the reconnect timer. All
//! session state lives in one [`SessionCore`] behind a single mutex that is
//! only held for short, non-awaiting critical sections; engine work is
//! serialized through the command worker and everything user-visible is
//! posted to the serial event executor.

use crate::adapter::{EngineAdapter, EngineCommand};
use crate::buffers::{PendingMessages, PendingStreams, PublishedStreams};
use crate::capability::PeerCapabilities;
use crate::config::ChannelConfig;
use crate::engine::{
    ConnectionStats, DataChannel, DataChannelState, EngineEvent, IceCandidate,
    IceConnectionState, PeerEngine, SdpType, SessionDescription, SignalingState,
};
use crate::error::P2pError;
use crate::events::EventQueue;
use crate::media::{LocalStream, MediaStreamHandle, RemoteStream, TrackSource};
use crate::observer::ChannelObserver;
use crate::protocol::{self, SignalPayload, SignalingMessage, TrackSourceEntry, UserAgent};
use crate::signaling::SignalingSender;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Label of the single data channel used for text messages
const DATA_CHANNEL_LABEL: &str = "message";

/// Completion callback for a successful operation
pub type OnSuccess = Box<dyn FnOnce() + Send + 'static>;
/// Completion callback for a failed operation
pub type OnFailure = Box<dyn FnOnce(P2pError) + Send + 'static>;
/// Completion callback carrying a statistics snapshot
pub type OnStats = Box<dyn FnOnce(ConnectionStats) + Send + 'static>;

/// Session negotiation state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The channel is idle; this is the initial state
    Ready,
    /// A local invitation was sent; waiting for the remote response
    Offered,
    /// A remote invitation arrived; waiting for the user's response
    Pending,
    /// Both sides agreed to connect; no SDP exchanged yet
    Matched,
    /// Offer/answer and ICE are in progress
    Connecting,
    /// The peer connection is established
    Connected,
}

/// Session state plus the per-connection scratch it guards
struct SessionCore {
    state: SessionState,
    is_caller: bool,
    is_creating_offer: bool,
    negotiation_needed: bool,
    capabilities: PeerCapabilities,
    deferred_remote_sdp: Option<SessionDescription>,
    pending_local_sdp: Option<SessionDescription>,
    remote_sdp_kind: Option<SdpType>,
    last_disconnect: Option<Instant>,
}

impl SessionCore {
    fn new() -> Self {
        SessionCore {
            state: SessionState::Ready,
            is_caller: false,
            is_creating_offer: false,
            negotiation_needed: false,
            capabilities: PeerCapabilities::default(),
            deferred_remote_sdp: None,
            pending_local_sdp: None,
            remote_sdp_kind: None,
            last_disconnect: None,
        }
    }

    fn transition(&mut self, to: SessionState) {
        info!(from = ?self.state, to = ?to, "session state changed");
        self.state = to;
    }

    /// Drop everything tied to the peer connection that just went away
    fn clean_peer_connection_state(&mut self) {
        self.deferred_remote_sdp = None;
        self.pending_local_sdp = None;
        self.remote_sdp_kind = None;
        self.negotiation_needed = false;
        self.last_disconnect = None;
    }
}

enum InvitationAction {
    NotifyInvited,
    SendAcceptance,
    Ignore,
}

/// Controller for a single peer-to-peer session with one remote identity
pub struct PeerChannel {
    me: Weak<PeerChannel>,
    config: ChannelConfig,
    local_id: String,
    remote_id: String,
    signaling: Arc<dyn SignalingSender>,
    engine: EngineAdapter,
    core: Mutex<SessionCore>,
    published: PublishedStreams,
    pending_streams: PendingStreams,
    pending_messages: PendingMessages,
    remote_streams: Mutex<HashMap<String, RemoteStream>>,
    remote_track_sources: Mutex<HashMap<String, TrackSource>>,
    observers: Mutex<Vec<Arc<dyn ChannelObserver>>>,
    data_channel: Mutex<Option<Arc<dyn DataChannel>>>,
    events: EventQueue,
}

impl PeerChannel {
    /// Create a channel for one remote identity
    ///
    /// The channel takes ownership of the signaling sender and consumes the
    /// engine's events from `engine_events`. Must be called inside a Tokio
    /// runtime; the channel spawns its engine worker and event pump there.
    pub fn new(
        config: ChannelConfig,
        local_id: impl Into<String>,
        remote_id: impl Into<String>,
        signaling: Box<dyn SignalingSender>,
        engine: Arc<dyn PeerEngine>,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Arc<Self> {
        let channel = Arc::new_cyclic(|me| PeerChannel {
            me: me.clone(),
            config,
            local_id: local_id.into(),
            remote_id: remote_id.into(),
            signaling: Arc::from(signaling),
            engine: EngineAdapter::new(engine),
            core: Mutex::new(SessionCore::new()),
            published: PublishedStreams::default(),
            pending_streams: PendingStreams::default(),
            pending_messages: PendingMessages::default(),
            remote_streams: Mutex::new(HashMap::new()),
            remote_track_sources: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            data_channel: Mutex::new(None),
            events: EventQueue::new(),
        });
        channel.spawn_event_pump(engine_events);
        channel
    }

    /// The local identity this channel speaks for
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The remote identity this channel is bound to
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Current session state
    pub fn session_state(&self) -> SessionState {
        self.core.lock().unwrap().state
    }

    /// Register an observer; callbacks run on the event executor in
    /// registration order
    pub fn add_observer(&self, observer: Arc<dyn ChannelObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Remove a previously registered observer
    pub fn remove_observer(&self, observer: &Arc<dyn ChannelObserver>) {
        self.observers
            .lock()
            .unwrap()
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    /// Send an invitation to the remote peer
    ///
    /// Valid in `Ready` and, as a re-invitation, in `Offered`. A
    /// `chat-closed` is emitted first as a best-effort reset of the remote
    /// side.
    pub async fn invite(&self, on_success: Option<OnSuccess>, on_failure: Option<OnFailure>) {
        {
            let core = self.core.lock().unwrap();
            if core.state != SessionState::Ready && core.state != SessionState::Offered {
                warn!(state = ?core.state, "cannot send invitation in this state");
                drop(core);
                self.post_failure(
                    on_failure,
                    P2pError::invalid_state("Cannot send invitation in this state."),
                );
                return;
            }
        }
        self.deliver_best_effort(&SignalingMessage::Closed).await;
        self.set_state(SessionState::Offered);
        let invitation = SignalingMessage::Invitation {
            ua: self.config.user_agent.clone(),
        };
        match self.deliver(&invitation).await {
            Ok(()) => self.post_success(on_success),
            Err(code) => {
                warn!(code, "invitation could not be delivered");
                {
                    let mut core = self.core.lock().unwrap();
                    if core.state == SessionState::Offered {
                        core.transition(SessionState::Ready);
                    }
                }
                self.post_failure(on_failure, send_failed());
            }
        }
    }

    /// Accept a pending remote invitation
    pub async fn accept(&self, on_success: Option<OnSuccess>, on_failure: Option<OnFailure>) {
        {
            let mut core = self.core.lock().unwrap();
            if core.state != SessionState::Pending {
                drop(core);
                self.post_failure(
                    on_failure,
                    P2pError::invalid_state("Cannot accept invitation in this state."),
                );
                return;
            }
            core.is_caller = false;
            self.engine.post(EngineCommand::InitializePeerConnection);
            core.transition(SessionState::Matched);
        }
        info!(remote_id = %self.remote_id, "accepting invitation");
        let acceptance = SignalingMessage::Accepted {
            ua: self.config.user_agent.clone(),
        };
        let delivery = self.deliver(&acceptance).await;
        self.engine
            .post(EngineCommand::CreateDataChannel(DATA_CHANNEL_LABEL.into()));
        match delivery {
            Ok(()) => self.post_success(on_success),
            Err(code) => {
                warn!(code, "acceptance could not be delivered");
                self.post_failure(on_failure, send_failed());
            }
        }
    }

    /// Deny a pending remote invitation
    pub async fn deny(&self, on_success: Option<OnSuccess>, on_failure: Option<OnFailure>) {
        {
            let mut core = self.core.lock().unwrap();
            if core.state != SessionState::Pending {
                drop(core);
                self.post_failure(
                    on_failure,
                    P2pError::invalid_state("Cannot deny invitation in this state."),
                );
                return;
            }
            core.transition(SessionState::Ready);
        }
        match self.deliver(&SignalingMessage::Denied).await {
            Ok(()) => self.post_success(on_success),
            Err(code) => {
                warn!(code, "denial could not be delivered");
                self.post_failure(on_failure, send_failed());
            }
        }
    }

    /// Tear the session down
    ///
    /// From `Connecting`/`Connected` the peer connection is closed and the
    /// stopped notification is emitted by the subsequent ICE-closed event;
    /// from `Offered` it is emitted here.
    pub async fn stop(&self, on_success: Option<OnSuccess>, on_failure: Option<OnFailure>) {
        info!(remote_id = %self.remote_id, "stopping session");
        let notify_stopped;
        {
            let mut core = self.core.lock().unwrap();
            match core.state {
                SessionState::Connecting | SessionState::Connected => {
                    self.engine.post(EngineCommand::ClosePeerConnection);
                    core.transition(SessionState::Ready);
                    notify_stopped = false;
                }
                SessionState::Matched => {
                    core.transition(SessionState::Ready);
                    notify_stopped = false;
                }
                SessionState::Offered => {
                    core.transition(SessionState::Ready);
                    notify_stopped = true;
                }
                _ => {
                    drop(core);
                    self.post_failure(
                        on_failure,
                        P2pError::invalid_state("Cannot stop a session that has not started."),
                    );
                    return;
                }
            }
        }
        if notify_stopped {
            self.notify_stopped();
        }
        self.deliver_best_effort(&SignalingMessage::Closed).await;
        self.post_success(on_success);
    }

    /// Publish a local stream to the remote peer
    ///
    /// Requires `Connected`. Without plan-B support on the remote side only
    /// one stream may be outstanding. Publication has no local success
    /// completion; failures are reported via `on_failure`.
    pub async fn publish(
        &self,
        stream: LocalStream,
        on_success: Option<OnSuccess>,
        on_failure: Option<OnFailure>,
    ) {
        info!(label = stream.media().label(), "publishing local stream");
        let capabilities = {
            let core = self.core.lock().unwrap();
            if core.state != SessionState::Connected {
                warn!("cannot publish a stream before the connection is established");
                drop(core);
                self.post_failure(
                    on_failure,
                    P2pError::invalid_state(
                        "Cannot publish a stream when connection is not established.",
                    ),
                );
                return;
            }
            core.capabilities
        };
        if !capabilities.supports_plan_b
            && self.published.len() + self.pending_streams.publish_len() > 0
        {
            warn!("remote side does not accept more than one published stream");
            self.post_failure(
                on_failure,
                P2pError::unsupported_method("Cannot publish multiple streams to remote side."),
            );
            return;
        }
        if !self.published.try_insert(stream.media().label()) {
            self.post_failure(
                on_failure,
                P2pError::invalid_argument("The stream is already published."),
            );
            return;
        }
        self.pending_streams.push_publish(stream);
        if self.ready_to_drain() {
            self.drain_pending_streams().await;
        }
        // The remote side observes the stream once negotiation finishes;
        // there is no local completion for publication.
        drop(on_success);
    }

    /// Withdraw a previously published stream
    pub async fn unpublish(
        &self,
        stream: &LocalStream,
        on_success: Option<OnSuccess>,
        on_failure: Option<OnFailure>,
    ) {
        let capabilities = self.core.lock().unwrap().capabilities;
        if !capabilities.supports_remove_stream {
            warn!("remote side does not support removing streams");
            self.post_failure(
                on_failure,
                P2pError::unsupported_method("Remote side does not support unpublish."),
            );
            return;
        }
        if !self.published.remove(stream.media().label()) {
            self.post_failure(
                on_failure,
                P2pError::invalid_argument("The stream is not published."),
            );
            return;
        }
        self.pending_streams.push_unpublish(stream.clone());
        self.post_success(on_success);
        if self.ready_to_drain() {
            self.drain_pending_streams().await;
        }
    }

    /// Send a text message over the session's data channel
    ///
    /// Messages queue until the channel opens; queuing counts as success and
    /// delivery stays best-effort, so `on_failure` is never invoked.
    pub async fn send(
        &self,
        message: &str,
        on_success: Option<OnSuccess>,
        on_failure: Option<OnFailure>,
    ) {
        let data_channel = self.data_channel.lock().unwrap().clone();
        match data_channel {
            Some(channel) if channel.state() == DataChannelState::Open => {
                debug!("sending data channel message");
                if let Err(error) = channel.send(message) {
                    warn!(%error, "data channel send failed; message dropped");
                }
            }
            existing => {
                self.pending_messages.push(message.to_string());
                if existing.is_none() {
                    self.engine
                        .post(EngineCommand::CreateDataChannel(DATA_CHANNEL_LABEL.into()));
                }
            }
        }
        self.post_success(on_success);
        let _ = on_failure;
    }

    /// Collect a statistics snapshot; requires `Connected`
    pub async fn get_connection_stats(&self, on_stats: OnStats, on_failure: Option<OnFailure>) {
        {
            let core = self.core.lock().unwrap();
            if core.state != SessionState::Connected {
                drop(core);
                self.post_failure(
                    on_failure,
                    P2pError::invalid_state(
                        "Cannot get connection stats in this state. Please try it after \
                         connection is established.",
                    ),
                );
                return;
            }
        }
        let (respond, result) = oneshot::channel();
        self.engine.post(EngineCommand::GetStats(respond));
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Ok(stats) = result.await {
                events.post(move || on_stats(stats));
            }
        });
    }

    /// Feed a raw inbound signaling string to the channel
    ///
    /// Unknown or malformed messages are logged and dropped.
    pub async fn on_incoming_signaling_message(&self, raw: &str) {
        debug!(len = raw.len(), "incoming signaling message");
        let Some(message) = protocol::decode(raw) else {
            return;
        };
        match message {
            SignalingMessage::Invitation { ua } => self.handle_invitation(ua).await,
            SignalingMessage::Accepted { ua } => self.handle_acceptance(ua),
            SignalingMessage::Denied => self.handle_deny(),
            SignalingMessage::Closed => self.handle_remote_stop(),
            SignalingMessage::Signal(payload) => self.handle_signal(payload),
            SignalingMessage::NegotiationNeeded => self.handle_negotiation_needed(),
            SignalingMessage::TrackSources(entries) => self.handle_track_sources(entries),
        }
    }

    // ---- inbound signaling ----

    async fn handle_invitation(&self, ua: UserAgent) {
        let capabilities = PeerCapabilities::classify(&ua);
        let action = {
            let mut core = self.core.lock().unwrap();
            core.capabilities = capabilities;
            match core.state {
                SessionState::Ready | SessionState::Pending => {
                    core.transition(SessionState::Pending);
                    InvitationAction::NotifyInvited
                }
                SessionState::Offered => {
                    // Simultaneous invitations: the side with the smaller id
                    // yields and becomes the callee.
                    if self.remote_id > self.local_id {
                        core.transition(SessionState::Matched);
                        InvitationAction::SendAcceptance
                    } else {
                        InvitationAction::Ignore
                    }
                }
                _ => {
                    info!("ignoring invitation; session already in progress");
                    InvitationAction::Ignore
                }
            }
        };
        match action {
            InvitationAction::NotifyInvited => {
                let remote = self.remote_id.clone();
                self.notify(move |observer| observer.on_invited(&remote));
            }
            InvitationAction::SendAcceptance => {
                let acceptance = SignalingMessage::Accepted {
                    ua: self.config.user_agent.clone(),
                };
                self.deliver_best_effort(&acceptance).await;
            }
            InvitationAction::Ignore => {}
        }
    }

    fn handle_acceptance(&self, ua: UserAgent) {
        let capabilities = PeerCapabilities::classify(&ua);
        {
            let mut core = self.core.lock().unwrap();
            if core.state != SessionState::Offered && core.state != SessionState::Matched {
                debug!(state = ?core.state, "ignoring acceptance in this state");
                return;
            }
            info!(remote_id = %self.remote_id, "remote peer accepted the invitation");
            core.transition(SessionState::Matched);
            core.is_caller = true;
            core.capabilities = capabilities;
            self.engine.post(EngineCommand::InitializePeerConnection);
            core.transition(SessionState::Connecting);
            self.engine
                .post(EngineCommand::CreateDataChannel(DATA_CHANNEL_LABEL.into()));
        }
        let remote = self.remote_id.clone();
        self.notify(move |observer| observer.on_accepted(&remote));
    }

    fn handle_deny(&self) {
        info!(remote_id = %self.remote_id, "remote peer denied the invitation");
        let remote = self.remote_id.clone();
        self.notify(move |observer| observer.on_denied(&remote));
        self.set_state(SessionState::Ready);
    }

    fn handle_remote_stop(&self) {
        let notify_stopped;
        {
            let mut core = self.core.lock().unwrap();
            match core.state {
                SessionState::Connecting | SessionState::Connected => {
                    self.engine.post(EngineCommand::ClosePeerConnection);
                    core.transition(SessionState::Ready);
                    notify_stopped = false;
                }
                SessionState::Pending | SessionState::Matched => {
                    // The invitation was withdrawn before any connection
                    // existed; report the stop directly.
                    core.transition(SessionState::Ready);
                    notify_stopped = true;
                }
                _ => {
                    warn!(state = ?core.state, "received stop in unexpected state");
                    notify_stopped = false;
                }
            }
        }
        if notify_stopped {
            self.notify_stopped();
        }
    }

    fn handle_negotiation_needed(&self) {
        debug!("remote side requested renegotiation");
        self.core.lock().unwrap().negotiation_needed = true;
        if self.engine.signaling_state() == SignalingState::Stable {
            self.create_offer();
        }
    }

    fn handle_signal(&self, payload: SignalPayload) {
        let mut core = self.core.lock().unwrap();
        if matches!(
            core.state,
            SessionState::Ready | SessionState::Offered | SessionState::Pending
        ) {
            warn!(state = ?core.state, "received signal payload in invalid state");
            return;
        }
        match payload {
            SignalPayload::Offer { sdp } => {
                if core.state == SessionState::Matched {
                    core.transition(SessionState::Connecting);
                }
                let description = SessionDescription {
                    kind: SdpType::Offer,
                    sdp,
                };
                if self.engine.signaling_state() != SignalingState::Stable {
                    // A newer offer supersedes any deferred one; it is
                    // applied at the next stable signaling state.
                    core.deferred_remote_sdp = Some(description);
                } else {
                    core.remote_sdp_kind = Some(SdpType::Offer);
                    self.engine
                        .post(EngineCommand::SetRemoteDescription(description));
                }
            }
            SignalPayload::Answer { sdp } => {
                core.remote_sdp_kind = Some(SdpType::Answer);
                self.engine
                    .post(EngineCommand::SetRemoteDescription(SessionDescription {
                        kind: SdpType::Answer,
                        sdp,
                    }));
            }
            SignalPayload::Candidate {
                sdp_mid,
                sdp_mline_index,
                candidate,
            } => {
                self.engine
                    .post(EngineCommand::AddIceCandidate(IceCandidate {
                        sdp_mid,
                        sdp_mline_index,
                        candidate,
                    }));
            }
        }
    }

    fn handle_track_sources(&self, entries: Vec<TrackSourceEntry>) {
        let mut sources = self.remote_track_sources.lock().unwrap();
        for entry in entries {
            sources.insert(entry.id, entry.source);
        }
    }

    // ---- engine events ----

    async fn handle_engine_event(&self, event: EngineEvent) {
        debug!(event = event.name(), "engine event");
        match event {
            EngineEvent::SignalingStateChanged(state) => self.handle_signaling_state(state).await,
            EngineEvent::IceConnectionStateChanged(state) => {
                self.handle_ice_connection_state(state).await
            }
            EngineEvent::IceCandidate(candidate) => self.handle_local_candidate(candidate).await,
            EngineEvent::StreamAdded(stream) => self.handle_stream_added(stream),
            EngineEvent::StreamRemoved(stream) => self.handle_stream_removed(stream),
            EngineEvent::DataChannel(channel) => self.handle_data_channel(channel),
            EngineEvent::RenegotiationNeeded => self.handle_renegotiation_needed().await,
            EngineEvent::SdpCreated(description) => self.handle_sdp_created(description),
            EngineEvent::SdpCreationFailed(error) => {
                warn!(%error, "creating session description failed");
                self.stop(None, None).await;
            }
            EngineEvent::LocalSdpApplied => self.handle_local_sdp_applied().await,
            EngineEvent::LocalSdpFailed(error) => {
                warn!(%error, "applying local description failed");
                self.stop(None, None).await;
            }
            EngineEvent::RemoteSdpApplied => self.handle_remote_sdp_applied(),
            EngineEvent::RemoteSdpFailed(error) => {
                warn!(%error, "applying remote description failed");
                self.stop(None, None).await;
            }
            EngineEvent::DataChannelStateChanged(state) => {
                if state == DataChannelState::Open {
                    self.drain_pending_messages();
                }
            }
            EngineEvent::DataChannelMessage(buffer) => self.handle_data_channel_message(buffer),
        }
    }

    async fn handle_signaling_state(&self, state: SignalingState) {
        if state != SignalingState::Stable {
            return;
        }
        let deferred = {
            let mut core = self.core.lock().unwrap();
            let deferred = core.deferred_remote_sdp.take();
            if deferred.is_some() {
                core.remote_sdp_kind = Some(SdpType::Offer);
            }
            deferred
        };
        match deferred {
            Some(description) => {
                info!("applying deferred remote description");
                self.engine
                    .post(EngineCommand::SetRemoteDescription(description));
            }
            None => self.check_waited_list().await,
        }
    }

    async fn handle_ice_connection_state(&self, state: IceConnectionState) {
        info!(state = ?state, "ice connection state changed");
        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                let (was_connecting, is_connected) = {
                    let mut core = self.core.lock().unwrap();
                    let was_connecting = core.state == SessionState::Connecting;
                    if was_connecting {
                        core.transition(SessionState::Connected);
                    }
                    let is_connected = core.state == SessionState::Connected;
                    if is_connected {
                        core.last_disconnect = None;
                    }
                    (was_connecting, is_connected)
                };
                if was_connecting {
                    let remote = self.remote_id.clone();
                    self.notify(move |observer| observer.on_started(&remote));
                }
                if is_connected {
                    self.check_waited_list().await;
                }
            }
            IceConnectionState::Disconnected => {
                self.core.lock().unwrap().last_disconnect = Some(Instant::now());
                self.schedule_reconnect_probe();
            }
            IceConnectionState::Closed => {
                self.notify_stopped();
                let mut core = self.core.lock().unwrap();
                core.clean_peer_connection_state();
                if core.state != SessionState::Ready {
                    core.transition(SessionState::Ready);
                }
            }
            _ => {}
        }
    }

    async fn handle_local_candidate(&self, candidate: IceCandidate) {
        debug!("relaying local ice candidate");
        let message = SignalingMessage::Signal(SignalPayload::Candidate {
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            candidate: candidate.candidate,
        });
        self.deliver_best_effort(&message).await;
    }

    async fn handle_renegotiation_needed(&self) {
        info!("engine requested renegotiation");
        let (is_caller, state) = {
            let core = self.core.lock().unwrap();
            (core.is_caller, core.state)
        };
        if !is_caller {
            // The callee asks the caller to start a new round; before the
            // session connects the initial offer already covers it.
            if matches!(state, SessionState::Connecting | SessionState::Connected) {
                self.deliver_best_effort(&SignalingMessage::NegotiationNeeded)
                    .await;
            }
        } else if self.engine.signaling_state() == SignalingState::Stable {
            self.create_offer();
        } else {
            self.core.lock().unwrap().negotiation_needed = true;
        }
    }

    fn handle_sdp_created(&self, description: SessionDescription) {
        debug!(kind = %description.kind, "session description created");
        self.core.lock().unwrap().pending_local_sdp = Some(description.clone());
        self.engine
            .post(EngineCommand::SetLocalDescription(description));
    }

    async fn handle_local_sdp_applied(&self) {
        debug!("local description applied");
        let description = {
            let mut core = self.core.lock().unwrap();
            core.is_creating_offer = false;
            core.pending_local_sdp.take()
        };
        self.engine.post(EngineCommand::ApplyBitrateSettings {
            max_audio_bitrate: self.config.max_audio_bitrate,
            max_video_bitrate: self.config.max_video_bitrate,
        });
        let Some(description) = description else {
            warn!("local description applied without a pending description");
            return;
        };
        let payload = match description.kind {
            SdpType::Offer => SignalPayload::Offer {
                sdp: description.sdp,
            },
            SdpType::Answer => SignalPayload::Answer {
                sdp: description.sdp,
            },
        };
        self.deliver_best_effort(&SignalingMessage::Signal(payload))
            .await;
    }

    fn handle_remote_sdp_applied(&self) {
        let was_offer = {
            let mut core = self.core.lock().unwrap();
            core.remote_sdp_kind.take() == Some(SdpType::Offer)
        };
        if was_offer {
            info!("remote offer applied; creating answer");
            self.engine.post(EngineCommand::CreateAnswer);
        }
    }

    fn handle_stream_added(&self, stream: MediaStreamHandle) {
        info!(label = stream.label(), "remote stream added");
        let (has_audio_source, video_source) = {
            let sources = self.remote_track_sources.lock().unwrap();
            let has_audio = stream
                .audio_tracks()
                .iter()
                .any(|id| sources.contains_key(id));
            let video = stream
                .video_tracks()
                .iter()
                .find_map(|id| sources.get(id).copied());
            (has_audio, video)
        };
        if !has_audio_source && video_source.is_none() {
            warn!(
                label = stream.label(),
                "no track source information for newly added stream"
            );
            return;
        }
        match video_source {
            Some(source @ (TrackSource::Camera | TrackSource::ScreenCast)) => {
                let remote_stream =
                    RemoteStream::new(stream.clone(), self.remote_id.clone(), source);
                self.remote_streams
                    .lock()
                    .unwrap()
                    .insert(stream.label().to_string(), remote_stream.clone());
                self.notify(move |observer| observer.on_stream_added(remote_stream.clone()));
            }
            _ => error!(label = stream.label(), "newly added stream is not recognized"),
        }
    }

    fn handle_stream_removed(&self, stream: MediaStreamHandle) {
        let removed = self.remote_streams.lock().unwrap().remove(stream.label());
        let Some(remote_stream) = removed else {
            warn!(label = stream.label(), "remove reported for an unknown stream");
            return;
        };
        self.notify(move |observer| observer.on_stream_removed(remote_stream.clone()));
        let mut sources = self.remote_track_sources.lock().unwrap();
        for id in stream.audio_tracks().iter().chain(stream.video_tracks()) {
            sources.remove(id);
        }
    }

    fn handle_data_channel(&self, channel: Arc<dyn DataChannel>) {
        debug!(label = channel.label(), "data channel available");
        // One channel per session; a newer channel replaces the old one.
        *self.data_channel.lock().unwrap() = Some(channel);
        self.drain_pending_messages();
    }

    fn handle_data_channel_message(&self, buffer: Vec<u8>) {
        match String::from_utf8(buffer) {
            Ok(message) => {
                let remote = self.remote_id.clone();
                self.notify(move |observer| observer.on_data(&remote, &message));
            }
            Err(_) => warn!("binary data channel frames are not supported"),
        }
    }

    // ---- negotiation helpers ----

    fn create_offer(&self) {
        {
            let mut core = self.core.lock().unwrap();
            if core.is_creating_offer {
                // Fold the request into the next negotiation round.
                core.negotiation_needed = true;
                return;
            }
            core.is_creating_offer = true;
            core.negotiation_needed = false;
        }
        info!("creating offer");
        self.engine.post(EngineCommand::CreateOffer);
    }

    async fn check_waited_list(&self) {
        if self.pending_streams.has_pending() {
            self.drain_pending_streams().await;
            return;
        }
        let renegotiate = {
            let core = self.core.lock().unwrap();
            core.negotiation_needed && core.is_caller
        };
        if renegotiate {
            self.create_offer();
        }
    }

    async fn drain_pending_streams(&self) {
        debug!("draining pending streams");
        for stream in self.pending_streams.take_publish() {
            // Source labels must reach the remote side before the tracks do.
            let entries = stream.track_source_entries();
            self.deliver_best_effort(&SignalingMessage::TrackSources(entries))
                .await;
            self.engine
                .post(EngineCommand::AddStream(stream.media().clone()));
        }
        for stream in self.pending_streams.take_unpublish() {
            self.engine
                .post(EngineCommand::RemoveStream(stream.media().clone()));
        }
    }

    fn drain_pending_messages(&self) {
        let Some(channel) = self.data_channel.lock().unwrap().clone() else {
            return;
        };
        if channel.state() != DataChannelState::Open {
            debug!("data channel not open yet; keeping messages queued");
            return;
        }
        let messages = self.pending_messages.take();
        if messages.is_empty() {
            return;
        }
        debug!(count = messages.len(), "draining pending messages");
        for message in messages {
            if let Err(error) = channel.send(&message) {
                warn!(%error, "failed to flush pending message");
            }
        }
    }

    fn ready_to_drain(&self) -> bool {
        self.core.lock().unwrap().state == SessionState::Connected
            && self.engine.signaling_state() == SignalingState::Stable
    }

    fn schedule_reconnect_probe(&self) {
        let channel = self.me.clone();
        let timeout = self.config.reconnect_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(channel) = channel.upgrade() else {
                return;
            };
            let expired = {
                let core = channel.core.lock().unwrap();
                matches!(core.last_disconnect, Some(since) if since.elapsed() >= timeout)
            };
            if expired {
                info!("reconnect window elapsed; stopping the session");
                channel.stop(None, None).await;
            } else {
                debug!("connection recovered within the reconnect window");
            }
        });
    }

    // ---- plumbing ----

    fn spawn_event_pump(&self, mut engine_events: mpsc::UnboundedReceiver<EngineEvent>) {
        let channel = self.me.clone();
        tokio::spawn(async move {
            while let Some(event) = engine_events.recv().await {
                let Some(channel) = channel.upgrade() else {
                    break;
                };
                channel.handle_engine_event(event).await;
            }
            debug!("engine event pump terminated");
        });
    }

    async fn deliver(&self, message: &SignalingMessage) -> Result<(), i32> {
        let raw = protocol::encode(message);
        self.signaling.send(&raw, &self.remote_id).await
    }

    async fn deliver_best_effort(&self, message: &SignalingMessage) {
        if let Err(code) = self.deliver(message).await {
            warn!(code, kind = message.kind(), "failed to deliver signaling message");
        }
    }

    fn set_state(&self, state: SessionState) {
        self.core.lock().unwrap().transition(state);
    }

    fn notify<F>(&self, notify: F)
    where
        F: Fn(&dyn ChannelObserver) + Send + 'static,
    {
        let observers = self.observers.lock().unwrap().clone();
        if observers.is_empty() {
            return;
        }
        self.events.post(move || {
            for observer in &observers {
                notify(observer.as_ref());
            }
        });
    }

    fn notify_stopped(&self) {
        let remote = self.remote_id.clone();
        self.notify(move |observer| observer.on_stopped(&remote));
    }

    fn post_success(&self, on_success: Option<OnSuccess>) {
        if let Some(callback) = on_success {
            self.events.post(callback);
        }
    }

    fn post_failure(&self, on_failure: Option<OnFailure>, error: P2pError) {
        if let Some(callback) = on_failure {
            self.events.post(move || callback(error));
        }
    }
}

fn send_failed() -> P2pError {
    P2pError::invalid_argument("Failed to send signaling message.")
}
