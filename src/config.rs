//! Channel configuration

use crate::protocol::UserAgent;
use std::time::Duration;

/// Configuration for a [`PeerChannel`](crate::channel::PeerChannel)
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long an ICE disconnect may last before the session is stopped
    pub reconnect_timeout: Duration,
    /// User agent advertised in invitations and acceptances
    pub user_agent: UserAgent,
    /// Maximum audio bitrate in kbps applied after local description setup
    pub max_audio_bitrate: Option<u32>,
    /// Maximum video bitrate in kbps applied after local description setup
    pub max_video_bitrate: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            reconnect_timeout: Duration::from_secs(10),
            user_agent: UserAgent::native(),
            max_audio_bitrate: None,
            max_video_bitrate: None,
        }
    }
}
