//! Frame source management.
//!
//! A session owns at most one [`FrameSource`]. Starting and stopping it is
//! idempotent and serialized so the underlying device is never acquired twice.

use crate::config::CameraConfig;
use crate::error::FrameError;
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A device that produces video frames.
#[async_trait]
pub trait FrameDevice: Send + Sync {
    /// Acquire the device.
    async fn open(&self) -> Result<(), FrameError>;

    /// Release the device.
    async fn close(&self);

    /// Grab the current frame at its native dimensions.
    async fn grab(&self) -> Result<RgbaImage, FrameError>;

    fn name(&self) -> &str;
}

/// Shared handle over the session's frame device.
pub struct FrameSource {
    device: Arc<dyn FrameDevice>,
    active: AtomicBool,
    transition: Mutex<()>,
}

impl FrameSource {
    pub fn new(device: Arc<dyn FrameDevice>) -> Self {
        Self {
            device,
            active: AtomicBool::new(false),
            transition: Mutex::new(()),
        }
    }

    /// Build the device selected in `config`.
    pub fn from_config(config: &CameraConfig) -> Result<Self, FrameError> {
        let device: Arc<dyn FrameDevice> = match config.device.as_str() {
            "test_pattern" => Arc::new(TestPatternDevice::new(config.width, config.height)),
            "still" => {
                let path = config
                    .still_path
                    .clone()
                    .ok_or_else(|| FrameError::Device("still device needs still_path".into()))?;
                Arc::new(StillImageDevice::new(path))
            }
            other => return Err(FrameError::Device(format!("unknown device '{}'", other))),
        };
        Ok(Self::new(device))
    }

    /// Check if the source is producing frames.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start the device. Returns `false` when it was already running.
    pub async fn start(&self) -> Result<bool, FrameError> {
        let _guard = self.transition.lock().await;
        if self.is_active() {
            debug!(device = %self.device.name(), "Frame source already active");
            return Ok(false);
        }

        self.device.open().await?;
        self.active.store(true, Ordering::SeqCst);
        info!(device = %self.device.name(), "Frame source started");
        Ok(true)
    }

    /// Stop the device. Returns `false` when it was not running.
    pub async fn stop(&self) -> bool {
        let _guard = self.transition.lock().await;
        if !self.is_active() {
            return false;
        }

        self.active.store(false, Ordering::SeqCst);
        self.device.close().await;
        info!(device = %self.device.name(), "Frame source stopped");
        true
    }

    /// Grab the current frame; fails when the source is not running.
    pub async fn grab(&self) -> Result<RgbaImage, FrameError> {
        if !self.is_active() {
            return Err(FrameError::NotStarted);
        }
        self.device.grab().await
    }
}

/// Synthetic gradient frames, one shade step per grab.
pub struct TestPatternDevice {
    width: u32,
    height: u32,
    frames: AtomicU64,
}

impl TestPatternDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl FrameDevice for TestPatternDevice {
    async fn open(&self) -> Result<(), FrameError> {
        self.frames.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) {}

    async fn grab(&self) -> Result<RgbaImage, FrameError> {
        let shift = (self.frames.fetch_add(1, Ordering::Relaxed) % 255) as u32;
        let (width, height) = (self.width, self.height);

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let intensity = ((x + y + shift) % 255) as u8;
            Rgba([intensity, intensity, intensity, 255])
        }))
    }

    fn name(&self) -> &str {
        "test_pattern"
    }
}

/// Serves one image loaded from disk when the device is opened.
pub struct StillImageDevice {
    path: PathBuf,
    frame: RwLock<Option<RgbaImage>>,
}

impl StillImageDevice {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            frame: RwLock::new(None),
        }
    }
}

#[async_trait]
impl FrameDevice for StillImageDevice {
    async fn open(&self) -> Result<(), FrameError> {
        let path = self.path.clone();
        let decoded = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| FrameError::Device(e.to_string()))?
            .map_err(|e| {
                warn!(path = %self.path.display(), error = %e, "Failed to load still frame");
                FrameError::Device(e.to_string())
            })?;

        *self.frame.write() = Some(decoded.to_rgba8());
        Ok(())
    }

    async fn close(&self) {
        self.frame.write().take();
    }

    async fn grab(&self) -> Result<RgbaImage, FrameError> {
        self.frame.read().clone().ok_or(FrameError::NotStarted)
    }

    fn name(&self) -> &str {
        "still"
    }
}
