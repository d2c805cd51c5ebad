//! Signaling transport seam
//!
//! The channel does not know how signaling strings reach the other side; an
//! implementation of [`SignalingSender`] is injected at construction and
//! owned by the channel for its whole lifetime.

use async_trait::async_trait;

/// Outbound half of the signaling transport
#[async_trait]
pub trait SignalingSender: Send + Sync {
    /// Deliver an opaque message string to the given remote identity
    ///
    /// A failure is reported as the transport's integer error code; the
    /// channel translates it to an invalid-argument error on the caller's
    /// failure callback.
    async fn send(&self, message: &str, remote_id: &str) -> Result<(), i32>;
}
