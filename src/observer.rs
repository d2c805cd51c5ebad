//! Session lifecycle observation
//!
//! Observers are invoked on the channel's serial event executor, in
//! registration order. Registering or removing observers from inside an
//! observer callback is not supported.

use crate::media::RemoteStream;

/// Callbacks for session lifecycle, data, and stream events
///
/// All methods default to no-ops so implementations only override what they
/// care about.
pub trait ChannelObserver: Send + Sync {
    /// The remote peer sent an invitation
    fn on_invited(&self, _remote_id: &str) {}

    /// The remote peer accepted the local invitation
    fn on_accepted(&self, _remote_id: &str) {}

    /// The remote peer denied the local invitation
    fn on_denied(&self, _remote_id: &str) {}

    /// The WebRTC session reached a connected state
    fn on_started(&self, _remote_id: &str) {}

    /// The session stopped, locally or remotely
    fn on_stopped(&self, _remote_id: &str) {}

    /// A text message arrived on the data channel
    fn on_data(&self, _remote_id: &str, _message: &str) {}

    /// A classified remote stream became available
    fn on_stream_added(&self, _stream: RemoteStream) {}

    /// A previously added remote stream went away
    fn on_stream_removed(&self, _stream: RemoteStream) {}
}
