//! Remote peer capability classification
//!
//! Capability flags are derived from the user agent a peer advertises in its
//! invitation or acceptance, before the session transitions forward, so that
//! a subsequent publish sees correct flags.

use crate::protocol::UserAgent;
use tracing::info;

/// What the remote peer's runtime is known to support
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCapabilities {
    /// Remote side can handle removal of a published stream
    pub supports_remove_stream: bool,
    /// Remote side accepts plan-B multi-stream SDP
    pub supports_plan_b: bool,
}

impl PeerCapabilities {
    /// Derive capability flags from an advertised user agent
    ///
    /// The `FireFox` runtime clears both flags; every other runtime name
    /// (including an absent one) sets both.
    pub fn classify(ua: &UserAgent) -> Self {
        let capabilities = if ua.runtime.name == "FireFox" {
            PeerCapabilities {
                supports_remove_stream: false,
                supports_plan_b: false,
            }
        } else {
            PeerCapabilities {
                supports_remove_stream: true,
                supports_plan_b: true,
            }
        };
        info!(
            runtime = %ua.runtime.name,
            supports_remove_stream = capabilities.supports_remove_stream,
            supports_plan_b = capabilities.supports_plan_b,
            "classified remote capabilities"
        );
        capabilities
    }
}
