//! WebRTC engine abstraction
//!
//! The channel never talks to a concrete WebRTC stack. It drives an
//! implementation of [`PeerEngine`] through a serialized command worker (see
//! the adapter) and consumes the engine's callbacks as [`EngineEvent`]s
//! delivered over an `mpsc` channel the caller wires up at construction.
//!
//! Engine operations are asynchronous: `create_offer`, `create_answer`,
//! description setup, and stats collection complete through events rather
//! than return values, mirroring how native WebRTC engines report back on
//! their own worker thread.

use crate::error::Result;
use crate::media::MediaStreamHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// An SDP offer
    Offer,
    /// An SDP answer
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// A session description exchanged through signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpType,
    /// SDP body
    pub sdp: String,
}

/// An ICE candidate exchanged through signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// Media stream identification tag
    pub sdp_mid: String,
    /// Index of the media description the candidate belongs to
    pub sdp_mline_index: u16,
    /// Candidate line
    pub candidate: String,
}

/// Signaling state of the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// No offer/answer exchange in progress
    Stable,
    /// A local offer has been applied
    HaveLocalOffer,
    /// A remote offer has been applied
    HaveRemoteOffer,
    /// The connection is closed
    Closed,
}

/// ICE connection state of the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    /// Gathering has not produced a usable pair yet
    New,
    /// Connectivity checks in progress
    Checking,
    /// A usable candidate pair was found
    Connected,
    /// Checks finished on all pairs
    Completed,
    /// All checks failed
    Failed,
    /// Connectivity was lost, checks are retrying
    Disconnected,
    /// The ICE transport shut down
    Closed,
}

/// State of a data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// Transport negotiation in progress
    Connecting,
    /// Messages can be sent
    Open,
    /// Shutdown in progress
    Closing,
    /// No more messages can be sent
    Closed,
}

/// Handle to an engine-owned data channel
pub trait DataChannel: Send + Sync {
    /// Label the channel was created with
    fn label(&self) -> &str;
    /// Current transport state
    fn state(&self) -> DataChannelState;
    /// Send a text frame; fails if the channel is not open
    fn send(&self, message: &str) -> Result<()>;
}

/// Snapshot of connection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total bytes sent over the connection
    pub bytes_sent: u64,
    /// Total bytes received over the connection
    pub bytes_received: u64,
    /// Packets reported lost by the remote side
    pub packets_lost: u64,
    /// Estimated round trip time, if available
    pub round_trip_time_ms: Option<u64>,
}

/// Callback events an engine reports back to the channel
pub enum EngineEvent {
    /// The signaling state moved
    SignalingStateChanged(SignalingState),
    /// The ICE connection state moved
    IceConnectionStateChanged(IceConnectionState),
    /// A local ICE candidate is ready to be relayed
    IceCandidate(IceCandidate),
    /// A remote media stream was added to the connection
    StreamAdded(MediaStreamHandle),
    /// A remote media stream was removed from the connection
    StreamRemoved(MediaStreamHandle),
    /// A data channel is available (locally created or remotely announced)
    DataChannel(Arc<dyn DataChannel>),
    /// The engine wants a new offer/answer round
    RenegotiationNeeded,
    /// `create_offer`/`create_answer` produced a description
    SdpCreated(SessionDescription),
    /// `create_offer`/`create_answer` failed
    SdpCreationFailed(String),
    /// The local description was applied
    LocalSdpApplied,
    /// Applying the local description failed
    LocalSdpFailed(String),
    /// The remote description was applied
    RemoteSdpApplied,
    /// Applying the remote description failed
    RemoteSdpFailed(String),
    /// The data channel's transport state moved
    DataChannelStateChanged(DataChannelState),
    /// An inbound data channel frame
    DataChannelMessage(Vec<u8>),
}

impl EngineEvent {
    /// Get the event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SignalingStateChanged(_) => "signaling_state_changed",
            EngineEvent::IceConnectionStateChanged(_) => "ice_connection_state_changed",
            EngineEvent::IceCandidate(_) => "ice_candidate",
            EngineEvent::StreamAdded(_) => "stream_added",
            EngineEvent::StreamRemoved(_) => "stream_removed",
            EngineEvent::DataChannel(_) => "data_channel",
            EngineEvent::RenegotiationNeeded => "renegotiation_needed",
            EngineEvent::SdpCreated(_) => "sdp_created",
            EngineEvent::SdpCreationFailed(_) => "sdp_creation_failed",
            EngineEvent::LocalSdpApplied => "local_sdp_applied",
            EngineEvent::LocalSdpFailed(_) => "local_sdp_failed",
            EngineEvent::RemoteSdpApplied => "remote_sdp_applied",
            EngineEvent::RemoteSdpFailed(_) => "remote_sdp_failed",
            EngineEvent::DataChannelStateChanged(_) => "data_channel_state_changed",
            EngineEvent::DataChannelMessage(_) => "data_channel_message",
        }
    }
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineEvent::{}", self.name())
    }
}

/// Capability set a WebRTC engine must provide
///
/// All methods are invoked from a single worker task; implementations do not
/// need to serialize calls themselves. Completions for the asynchronous
/// operations arrive as [`EngineEvent`]s.
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Create the underlying peer connection; idempotent within a session
    async fn initialize_peer_connection(&self) -> Result<()>;

    /// Start creating an offer; completes via [`EngineEvent::SdpCreated`]
    async fn create_offer(&self);

    /// Start creating an answer; completes via [`EngineEvent::SdpCreated`]
    async fn create_answer(&self);

    /// Apply a local description; completes via [`EngineEvent::LocalSdpApplied`]
    async fn set_local_description(&self, description: SessionDescription);

    /// Apply a remote description; completes via [`EngineEvent::RemoteSdpApplied`]
    async fn set_remote_description(&self, description: SessionDescription);

    /// Feed a remote ICE candidate to the connection
    async fn add_ice_candidate(&self, candidate: IceCandidate);

    /// Attach a local media stream; only valid while signaling is stable
    async fn add_stream(&self, stream: MediaStreamHandle);

    /// Detach a local media stream; only valid while signaling is stable
    async fn remove_stream(&self, stream: MediaStreamHandle);

    /// Open a data channel with the given label
    async fn create_data_channel(&self, label: &str);

    /// Tear the peer connection down
    async fn close_peer_connection(&self);

    /// Collect a statistics snapshot
    async fn get_stats(&self) -> Result<ConnectionStats>;

    /// Constrain outbound bitrates on the current local description
    async fn apply_bitrate_settings(
        &self,
        max_audio_bitrate: Option<u32>,
        max_video_bitrate: Option<u32>,
    );

    /// Current signaling state, readable from any thread
    fn signaling_state(&self) -> SignalingState;
}
