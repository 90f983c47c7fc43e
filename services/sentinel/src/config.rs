//! Configuration management for the sentinel service.
//!
//! Values are layered: built-in defaults, then `config/sentinel.*`, then
//! `/etc/sentinel/sentinel.*`, then `SENTINEL__SECTION__KEY` environment
//! variables.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the sentinel service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Buffer sizes
    #[serde(default)]
    pub buffers: BufferConfig,
    /// Alarm thresholds and cooldown
    #[serde(default)]
    pub alarms: AlarmConfig,
    /// Evidence capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Frame source configuration
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Capacities of the derived collections and the ingest queue.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Points kept in the metric history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Entries kept in the event log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// Snapshots that may wait for reduction
    #[serde(default = "default_snapshot_queue")]
    pub snapshot_queue: usize,
}

/// Alarm predicates and the shared capture cooldown.
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmConfig {
    /// Minimum time between two capture batches in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Smoke reading above which a capture fires
    #[serde(default = "default_smoke_threshold")]
    pub smoke_threshold: f64,
    /// Fence current (amps) above which a capture fires
    #[serde(default = "default_current_threshold")]
    pub current_threshold: f64,
    /// Only evaluate alarms while the frame source is running
    #[serde(default = "default_true")]
    pub require_camera: bool,
}

/// Where captured evidence goes.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Primary sink directory, linked at startup when set
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Fallback delivery directory
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

/// Frame source selection.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Device kind: test_pattern or still
    #[serde(default = "default_camera_device")]
    pub device: String,
    /// Frame width in pixels
    #[serde(default = "default_camera_width")]
    pub width: u32,
    /// Frame height in pixels
    #[serde(default = "default_camera_height")]
    pub height: u32,
    /// Image served by the still device
    #[serde(default)]
    pub still_path: Option<PathBuf>,
    /// Start the frame source with the session
    #[serde(default)]
    pub autostart: bool,
}

// Default value functions
fn default_service_name() -> String {
    "fence-sentinel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_history_capacity() -> usize {
    crate::history::DEFAULT_CAPACITY
}

fn default_log_capacity() -> usize {
    crate::ledger::DEFAULT_CAPACITY
}

fn default_snapshot_queue() -> usize {
    64
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_smoke_threshold() -> f64 {
    300.0
}

fn default_current_threshold() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_camera_device() -> String {
    "test_pattern".to_string()
}

fn default_camera_width() -> u32 {
    1280
}

fn default_camera_height() -> u32 {
    720
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            metrics_port: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            log_capacity: default_log_capacity(),
            snapshot_queue: default_snapshot_queue(),
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            smoke_threshold: default_smoke_threshold(),
            current_threshold: default_current_threshold(),
            require_camera: true,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            directory: None,
            download_dir: default_download_dir(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            width: default_camera_width(),
            height: default_camera_height(),
            still_path: None,
            autostart: false,
        }
    }
}

impl AlarmConfig {
    /// Get the capture cooldown as Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/sentinel").required(false))
            .add_source(config::File::with_name("/etc/sentinel/sentinel").required(false))
            // SENTINEL__ALARMS__COOLDOWN_MS -> alarms.cooldown_ms
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.buffers.history_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "buffers.history_capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.buffers.log_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "buffers.log_capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.buffers.snapshot_queue == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "buffers.snapshot_queue".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.alarms.cooldown().is_zero() {
            return Err(ConfigValidationError::InvalidValue {
                field: "alarms.cooldown_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        match self.camera.device.as_str() {
            "test_pattern" => {}
            "still" => {
                if self.camera.still_path.is_none() {
                    return Err(ConfigValidationError::MissingField(
                        "camera.still_path".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigValidationError::InvalidValue {
                    field: "camera.device".to_string(),
                    message: format!("unknown device '{}'", other),
                });
            }
        }

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "camera".to_string(),
                message: "frame dimensions must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
