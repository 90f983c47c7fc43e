use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a frame source.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame source not started")]
    NotStarted,

    #[error("Frame source already active")]
    AlreadyActive,

    #[error("Frame device error: {0}")]
    Device(String),
}

/// Errors raised by an artifact sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sink access revoked: {0}")]
    Revoked(String),
}

/// Errors that end one capture attempt.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No active frame source")]
    NoFrameSource,

    #[error("Frame grab failed: {0}")]
    Frame(#[from] FrameError),

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Render task failed: {0}")]
    Render(String),

    #[error("Fallback delivery failed: {0}")]
    FallbackDeliveryFailure(#[source] SinkError),
}
