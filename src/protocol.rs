//! Signaling message codec
//!
//! Typed representation of the JSON envelopes exchanged over the out-of-band
//! signaling transport. Every message is `{"type": <string>, "data": <value>}`
//! where `data` is omitted for bare notifications.
//!
//! Decoding fails softly: a message that cannot be parsed, carries no `type`,
//! or carries an unknown `type` is logged and dropped, never surfaced to the
//! user.

use crate::media::TrackSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

const MESSAGE_TYPE_KEY: &str = "type";
const MESSAGE_DATA_KEY: &str = "data";
const USER_AGENT_KEY: &str = "ua";

const TYPE_INVITATION: &str = "chat-invitation";
const TYPE_ACCEPTED: &str = "chat-accepted";
const TYPE_DENIED: &str = "chat-denied";
const TYPE_CLOSED: &str = "chat-closed";
const TYPE_SIGNAL: &str = "chat-signal";
const TYPE_NEGOTIATION_NEEDED: &str = "chat-negotiation-needed";
const TYPE_TRACK_SOURCES: &str = "chat-track-sources";

/// SDK identification advertised in invitations and acceptances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
    /// SDK flavor, e.g. `rust`
    #[serde(rename = "type", default)]
    pub kind: String,
    /// SDK version string
    #[serde(default)]
    pub version: String,
}

/// Runtime identification advertised in invitations and acceptances
///
/// Empty on native SDKs; browser name/version on JavaScript peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Runtime name, e.g. a browser name
    #[serde(default)]
    pub name: String,
    /// Runtime version string
    #[serde(default)]
    pub version: String,
}

/// User agent description carried by `chat-invitation` and `chat-accepted`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgent {
    /// SDK identification
    #[serde(default)]
    pub sdk: SdkInfo,
    /// Runtime identification
    #[serde(default)]
    pub runtime: RuntimeInfo,
}

impl UserAgent {
    /// The user agent advertised by this SDK
    pub fn native() -> Self {
        UserAgent {
            sdk: SdkInfo {
                kind: "rust".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            runtime: RuntimeInfo::default(),
        }
    }
}

/// One `(track id, source)` pair of a `chat-track-sources` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSourceEntry {
    /// Opaque media track id
    pub id: String,
    /// Source label for the track
    pub source: TrackSource,
}

/// Payload of a `chat-signal` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    /// A session description offer
    Offer {
        /// SDP body
        sdp: String,
    },
    /// A session description answer
    Answer {
        /// SDP body
        sdp: String,
    },
    /// An ICE candidate
    #[serde(rename = "candidates")]
    Candidate {
        /// Media stream identification tag
        #[serde(rename = "sdpMid")]
        sdp_mid: String,
        /// Index of the media description the candidate belongs to
        #[serde(rename = "sdpMLineIndex")]
        sdp_mline_index: u16,
        /// Candidate line
        candidate: String,
    },
}

/// A decoded signaling envelope
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    /// `chat-invitation`: remote side proposes a session
    Invitation {
        /// Advertised user agent of the sender
        ua: UserAgent,
    },
    /// `chat-accepted`: remote side accepted an invitation
    Accepted {
        /// Advertised user agent of the sender
        ua: UserAgent,
    },
    /// `chat-denied`: remote side denied an invitation
    Denied,
    /// `chat-closed`: remote side tore the session down
    Closed,
    /// `chat-signal`: SDP or ICE payload
    Signal(SignalPayload),
    /// `chat-negotiation-needed`: remote side requests renegotiation
    NegotiationNeeded,
    /// `chat-track-sources`: source labels for upcoming media tracks
    TrackSources(Vec<TrackSourceEntry>),
}

impl SignalingMessage {
    /// Get the wire `type` string of this message
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Invitation { .. } => TYPE_INVITATION,
            SignalingMessage::Accepted { .. } => TYPE_ACCEPTED,
            SignalingMessage::Denied => TYPE_DENIED,
            SignalingMessage::Closed => TYPE_CLOSED,
            SignalingMessage::Signal(_) => TYPE_SIGNAL,
            SignalingMessage::NegotiationNeeded => TYPE_NEGOTIATION_NEEDED,
            SignalingMessage::TrackSources(_) => TYPE_TRACK_SOURCES,
        }
    }
}

/// Encode a signaling message into its JSON envelope
pub fn encode(message: &SignalingMessage) -> String {
    let envelope = match message {
        SignalingMessage::Invitation { ua } => json!({
            MESSAGE_TYPE_KEY: TYPE_INVITATION,
            MESSAGE_DATA_KEY: { USER_AGENT_KEY: ua },
        }),
        SignalingMessage::Accepted { ua } => json!({
            MESSAGE_TYPE_KEY: TYPE_ACCEPTED,
            MESSAGE_DATA_KEY: { USER_AGENT_KEY: ua },
        }),
        SignalingMessage::Denied => json!({ MESSAGE_TYPE_KEY: TYPE_DENIED }),
        SignalingMessage::Closed => json!({ MESSAGE_TYPE_KEY: TYPE_CLOSED }),
        SignalingMessage::Signal(payload) => json!({
            MESSAGE_TYPE_KEY: TYPE_SIGNAL,
            MESSAGE_DATA_KEY: payload,
        }),
        SignalingMessage::NegotiationNeeded => {
            json!({ MESSAGE_TYPE_KEY: TYPE_NEGOTIATION_NEEDED })
        }
        SignalingMessage::TrackSources(entries) => json!({
            MESSAGE_TYPE_KEY: TYPE_TRACK_SOURCES,
            MESSAGE_DATA_KEY: entries,
        }),
    };
    envelope.to_string()
}

/// Decode a raw signaling string into a typed message
///
/// Returns `None` (after logging) for anything that is not a well-formed,
/// recognized envelope.
pub fn decode(raw: &str) -> Option<SignalingMessage> {
    let envelope: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "cannot parse incoming signaling message");
            return None;
        }
    };
    let kind = match envelope.get(MESSAGE_TYPE_KEY).and_then(Value::as_str) {
        Some(kind) if !kind.is_empty() => kind,
        _ => {
            warn!("incoming signaling message carries no type");
            return None;
        }
    };
    let data = envelope.get(MESSAGE_DATA_KEY);
    match kind {
        TYPE_INVITATION => Some(SignalingMessage::Invitation {
            ua: user_agent_from(data),
        }),
        TYPE_ACCEPTED => Some(SignalingMessage::Accepted {
            ua: user_agent_from(data),
        }),
        TYPE_DENIED => Some(SignalingMessage::Denied),
        TYPE_CLOSED => Some(SignalingMessage::Closed),
        TYPE_NEGOTIATION_NEEDED => Some(SignalingMessage::NegotiationNeeded),
        TYPE_SIGNAL => {
            let payload = data.cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<SignalPayload>(payload) {
                Ok(payload) => Some(SignalingMessage::Signal(payload)),
                Err(error) => {
                    warn!(%error, "cannot parse chat-signal payload");
                    None
                }
            }
        }
        TYPE_TRACK_SOURCES => {
            let payload = data.cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<Vec<TrackSourceEntry>>(payload) {
                Ok(entries) => Some(SignalingMessage::TrackSources(entries)),
                Err(error) => {
                    warn!(%error, "cannot parse chat-track-sources payload");
                    None
                }
            }
        }
        unknown => {
            warn!(kind = unknown, "received unknown signaling message type");
            None
        }
    }
}

fn user_agent_from(data: Option<&Value>) -> UserAgent {
    data.and_then(|data| data.get(USER_AGENT_KEY))
        .cloned()
        .and_then(|ua| serde_json::from_value(ua).ok())
        .unwrap_or_default()
}
