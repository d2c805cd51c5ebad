//! Engine command serialization
//!
//! Every engine mutation is posted as an [`EngineCommand`] onto an unbounded
//! queue drained by a single worker task, so the engine only ever sees one
//! call at a time and callers never block on the engine.

use crate::engine::{
    ConnectionStats, IceCandidate, PeerEngine, SessionDescription, SignalingState,
};
use crate::media::MediaStreamHandle;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// A queued engine operation
pub(crate) enum EngineCommand {
    InitializePeerConnection,
    CreateOffer,
    CreateAnswer,
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddIceCandidate(IceCandidate),
    AddStream(MediaStreamHandle),
    RemoveStream(MediaStreamHandle),
    CreateDataChannel(String),
    ClosePeerConnection,
    GetStats(oneshot::Sender<ConnectionStats>),
    ApplyBitrateSettings {
        max_audio_bitrate: Option<u32>,
        max_video_bitrate: Option<u32>,
    },
}

/// Serializes channel-issued operations onto the engine's worker
pub(crate) struct EngineAdapter {
    commands: mpsc::UnboundedSender<EngineCommand>,
    engine: Arc<dyn PeerEngine>,
}

impl EngineAdapter {
    /// Wrap an engine and spawn its command worker
    pub(crate) fn new(engine: Arc<dyn PeerEngine>) -> Self {
        let (commands, mut queue) = mpsc::unbounded_channel::<EngineCommand>();
        let worker_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Some(command) = queue.recv().await {
                execute(worker_engine.as_ref(), command).await;
            }
            debug!("engine command worker terminated");
        });
        EngineAdapter { commands, engine }
    }

    /// Queue a command for the worker; drops it if the worker is gone
    pub(crate) fn post(&self, command: EngineCommand) {
        if self.commands.send(command).is_err() {
            warn!("engine command worker is gone; dropping command");
        }
    }

    /// Read the engine's current signaling state
    pub(crate) fn signaling_state(&self) -> SignalingState {
        self.engine.signaling_state()
    }
}

async fn execute(engine: &dyn PeerEngine, command: EngineCommand) {
    match command {
        EngineCommand::InitializePeerConnection => {
            if let Err(e) = engine.initialize_peer_connection().await {
                error!(error = %e, "failed to initialize peer connection");
            }
        }
        EngineCommand::CreateOffer => engine.create_offer().await,
        EngineCommand::CreateAnswer => engine.create_answer().await,
        EngineCommand::SetLocalDescription(description) => {
            engine.set_local_description(description).await
        }
        EngineCommand::SetRemoteDescription(description) => {
            engine.set_remote_description(description).await
        }
        EngineCommand::AddIceCandidate(candidate) => engine.add_ice_candidate(candidate).await,
        EngineCommand::AddStream(stream) => engine.add_stream(stream).await,
        EngineCommand::RemoveStream(stream) => engine.remove_stream(stream).await,
        EngineCommand::CreateDataChannel(label) => engine.create_data_channel(&label).await,
        EngineCommand::ClosePeerConnection => engine.close_peer_connection().await,
        EngineCommand::GetStats(respond) => match engine.get_stats().await {
            Ok(stats) => {
                let _ = respond.send(stats);
            }
            Err(e) => warn!(error = %e, "failed to collect connection stats"),
        },
        EngineCommand::ApplyBitrateSettings {
            max_audio_bitrate,
            max_video_bitrate,
        } => {
            engine
                .apply_bitrate_settings(max_audio_bitrate, max_video_bitrate)
                .await
        }
    }
}
