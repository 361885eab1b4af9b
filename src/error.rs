//! Error taxonomy shared by every stage of the unrest pipeline.

use thiserror::Error;

/// Errors surfaced by the analysis, control, and synthesis stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("failed to initialize {device}: {reason}")]
    InitializationFailure { device: &'static str, reason: String },

    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("transient read error: {0}")]
    TransientRead(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid audio frame: {0}")]
    InvalidFrame(String),

    #[error("timestamp moved backwards ({previous_ms} ms -> {next_ms} ms)")]
    InvalidTimestamp { previous_ms: u64, next_ms: u64 },

    #[error("playback write failed: {0}")]
    PlaybackWrite(String),

    #[error("{0} worker disconnected")]
    WorkerDisconnected(&'static str),
}

impl PipelineError {
    /// Whether the error must tear the session down. Per-frame read hiccups are
    /// absorbed so the real-time path can keep running overnight.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::TransientRead(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::InitializationFailure { .. } => "initialization_failure",
            PipelineError::PermissionDenied(_) => "permission_denied",
            PipelineError::TransientRead(_) => "transient_read",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::InvalidFrame(_) => "invalid_frame",
            PipelineError::InvalidTimestamp { .. } => "invalid_timestamp",
            PipelineError::PlaybackWrite(_) => "playback_write",
            PipelineError::WorkerDisconnected(_) => "worker_disconnected",
        }
    }
}
