//! PeerMedia P2P - peer-to-peer session control core
//!
//! This crate is the session-control heart of the PeerMedia SDK: for each
//! remote identity it runs one [`PeerChannel`] that negotiates, maintains,
//! and tears down a single WebRTC session over an out-of-band signaling
//! transport.
//!
//! # Architecture
//!
//! The channel is a pure coordination layer with two injected seams:
//!
//! - [`SignalingSender`] delivers opaque JSON envelopes to the remote
//!   identity (the transport itself — websocket, REST, XMPP — is up to the
//!   embedder).
//! - [`PeerEngine`] wraps a concrete WebRTC stack; the channel drives it
//!   through a serialized command worker and consumes its callbacks as
//!   [`EngineEvent`]s.
//!
//! ```text
//! caller API ──┐                       ┌── engine worker ── PeerEngine
//!              ├── PeerChannel (FSM) ──┤
//! signaling ───┘        │              └── event executor ── observers,
//!   inbound             └── SignalingSender                   completions
//! ```
//!
//! Observers and user completion callbacks always run on a dedicated serial
//! executor, never on the engine worker or a signaling delivery thread.
//!
//! # Example
//!
//! ```ignore
//! use peermedia_p2p::{ChannelConfig, PeerChannel};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! let (engine_events_tx, engine_events_rx) = mpsc::unbounded_channel();
//! let engine = Arc::new(MyEngine::new(engine_events_tx));
//! let channel = PeerChannel::new(
//!     ChannelConfig::default(),
//!     "alice",
//!     "bob",
//!     Box::new(MySignalingSender::new()),
//!     engine,
//!     engine_events_rx,
//! );
//! channel.invite(None, None).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod adapter;
mod buffers;
mod events;

pub mod capability;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod observer;
pub mod protocol;
pub mod signaling;

pub use capability::PeerCapabilities;
pub use channel::{OnFailure, OnStats, OnSuccess, PeerChannel, SessionState};
pub use config::ChannelConfig;
pub use engine::{
    ConnectionStats, DataChannel, DataChannelState, EngineEvent, IceCandidate,
    IceConnectionState, PeerEngine, SdpType, SessionDescription, SignalingState,
};
pub use error::{ErrorKind, P2pError, Result};
pub use media::{LocalStream, MediaStreamHandle, RemoteStream, TrackSource};
pub use observer::ChannelObserver;
pub use protocol::{SignalPayload, SignalingMessage, UserAgent};
pub use signaling::SignalingSender;
