//! Evidence capture: grab, annotate, encode, persist.

use crate::camera::FrameSource;
use crate::dispatcher::CaptureRequest;
use crate::error::{CaptureError, FrameError};
use crate::overlay;
use crate::sink::{ArtifactRef, ArtifactSink};
use chrono::Local;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Format of the `TIME:` overlay line
pub const OVERLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Extension of encoded artifacts
pub const ARTIFACT_EXTENSION: &str = "png";

/// Filename for a capture of `tag`. Collisions are left to the sink.
pub fn artifact_filename(tag: &str) -> String {
    format!("Image_Detected_{}.{}", tag, ARTIFACT_EXTENSION)
}

/// Renders alarm snapshots and persists them through primary then fallback sink.
pub struct CapturePipeline {
    frames: Arc<FrameSource>,
    primary: RwLock<Option<Arc<dyn ArtifactSink>>>,
    fallback: Arc<dyn ArtifactSink>,
}

impl CapturePipeline {
    pub fn new(frames: Arc<FrameSource>, fallback: Arc<dyn ArtifactSink>) -> Self {
        Self {
            frames,
            primary: RwLock::new(None),
            fallback,
        }
    }

    /// Link or unlink the primary directory sink.
    pub fn set_primary(&self, sink: Option<Arc<dyn ArtifactSink>>) {
        match &sink {
            Some(s) => info!(sink = %s.describe(), "Primary sink linked"),
            None => info!("Primary sink cleared"),
        }
        *self.primary.write() = sink;
    }

    pub fn has_primary(&self) -> bool {
        self.primary.read().is_some()
    }

    pub fn frames(&self) -> &Arc<FrameSource> {
        &self.frames
    }

    /// Capture one annotated frame for `request`.
    ///
    /// Fails fast with [`CaptureError::NoFrameSource`] when the camera is not
    /// running. Never retries.
    #[instrument(skip(self), fields(tag = %request.tag))]
    pub async fn capture(&self, request: &CaptureRequest) -> Result<ArtifactRef, CaptureError> {
        if !self.frames.is_active() {
            return Err(CaptureError::NoFrameSource);
        }

        let frame = match self.frames.grab().await {
            Ok(frame) => frame,
            // Stopped between the check and the grab.
            Err(FrameError::NotStarted) => return Err(CaptureError::NoFrameSource),
            Err(e) => return Err(e.into()),
        };

        let tag = request.tag.as_str();
        let time = request
            .requested_at
            .with_timezone(&Local)
            .format(OVERLAY_TIME_FORMAT)
            .to_string();

        let bytes = tokio::task::spawn_blocking(move || render(frame, tag, &time))
            .await
            .map_err(|e| CaptureError::Render(e.to_string()))??;

        let filename = artifact_filename(tag);
        self.persist(&filename, &bytes).await
    }

    /// Primary sink if linked, otherwise or on failure the fallback sink.
    async fn persist(&self, filename: &str, bytes: &[u8]) -> Result<ArtifactRef, CaptureError> {
        let primary = self.primary.read().clone();

        if let Some(sink) = primary {
            match sink.deliver(filename, bytes).await {
                Ok(artifact) => {
                    info!(
                        filename = %filename,
                        path = %artifact.path.display(),
                        "Saved capture to linked directory"
                    );
                    return Ok(artifact);
                }
                Err(e) => {
                    warn!(
                        filename = %filename,
                        sink = %sink.describe(),
                        error = %e,
                        "Direct save failed, falling back to download"
                    );
                    metrics::counter!("sentinel.sink.primary_failures").increment(1);
                }
            }
        }

        let artifact = self
            .fallback
            .deliver(filename, bytes)
            .await
            .map_err(CaptureError::FallbackDeliveryFailure)?;

        info!(
            filename = %filename,
            path = %artifact.path.display(),
            "Capture delivered as download"
        );
        Ok(artifact)
    }
}

/// Annotate and encode a frame at its native dimensions.
fn render(mut frame: RgbaImage, tag: &str, time: &str) -> Result<Vec<u8>, CaptureError> {
    overlay::annotate(&mut frame, tag, time);

    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(bytes)
}
