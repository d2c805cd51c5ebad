//! Local and remote media stream model
//!
//! Streams are opaque handles as far as this crate is concerned: a label plus
//! the ids of the tracks they carry. Track payloads never cross this layer;
//! only the out-of-band source labels do.

use crate::protocol::TrackSourceEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source label classifying a media track's origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackSource {
    /// Microphone capture
    Mic,
    /// Camera capture
    Camera,
    /// Screen or window capture
    ScreenCast,
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::Mic => write!(f, "mic"),
            TrackSource::Camera => write!(f, "camera"),
            TrackSource::ScreenCast => write!(f, "screen-cast"),
        }
    }
}

/// Engine-level media stream handle: a label plus its track ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamHandle {
    label: String,
    audio_tracks: Vec<String>,
    video_tracks: Vec<String>,
}

impl MediaStreamHandle {
    /// Create a handle from a stream label and its track ids
    pub fn new(
        label: impl Into<String>,
        audio_tracks: Vec<String>,
        video_tracks: Vec<String>,
    ) -> Self {
        MediaStreamHandle {
            label: label.into(),
            audio_tracks,
            video_tracks,
        }
    }

    /// The engine's label for this stream
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ids of the audio tracks in this stream
    pub fn audio_tracks(&self) -> &[String] {
        &self.audio_tracks
    }

    /// Ids of the video tracks in this stream
    pub fn video_tracks(&self) -> &[String] {
        &self.video_tracks
    }
}

/// A local stream queued for publication to the remote peer
#[derive(Debug, Clone)]
pub struct LocalStream {
    media: MediaStreamHandle,
    audio_source: TrackSource,
    video_source: TrackSource,
}

impl LocalStream {
    /// Create a local stream with explicit source labels
    pub fn new(media: MediaStreamHandle, audio_source: TrackSource, video_source: TrackSource) -> Self {
        LocalStream {
            media,
            audio_source,
            video_source,
        }
    }

    /// A microphone + camera stream
    pub fn camera(media: MediaStreamHandle) -> Self {
        LocalStream::new(media, TrackSource::Mic, TrackSource::Camera)
    }

    /// A screen-cast stream (both audio and video captured from the screen)
    pub fn screen_cast(media: MediaStreamHandle) -> Self {
        LocalStream::new(media, TrackSource::ScreenCast, TrackSource::ScreenCast)
    }

    /// The underlying media handle
    pub fn media(&self) -> &MediaStreamHandle {
        &self.media
    }

    /// Source label of the audio tracks
    pub fn audio_source(&self) -> TrackSource {
        self.audio_source
    }

    /// Source label of the video tracks
    pub fn video_source(&self) -> TrackSource {
        self.video_source
    }

    /// Build the `(id, source)` pairs advertised ahead of publication
    pub(crate) fn track_source_entries(&self) -> Vec<TrackSourceEntry> {
        let mut entries = Vec::with_capacity(
            self.media.audio_tracks().len() + self.media.video_tracks().len(),
        );
        for id in self.media.audio_tracks() {
            entries.push(TrackSourceEntry {
                id: id.clone(),
                source: self.audio_source,
            });
        }
        for id in self.media.video_tracks() {
            entries.push(TrackSourceEntry {
                id: id.clone(),
                source: self.video_source,
            });
        }
        entries
    }
}

/// A remote stream surfaced to observers once its source is classified
#[derive(Debug, Clone)]
pub struct RemoteStream {
    media: MediaStreamHandle,
    origin: String,
    source: TrackSource,
}

impl RemoteStream {
    pub(crate) fn new(media: MediaStreamHandle, origin: String, source: TrackSource) -> Self {
        RemoteStream {
            media,
            origin,
            source,
        }
    }

    /// The underlying media handle
    pub fn media(&self) -> &MediaStreamHandle {
        &self.media
    }

    /// Identity of the peer the stream originates from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Classified source of the stream's video
    pub fn source(&self) -> TrackSource {
        self.source
    }
}
