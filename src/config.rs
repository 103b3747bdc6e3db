//! Configuration management for the detection streamer

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::{DetectionFilter, DetectorBackend, DetectorOptions};
use crate::worker::FailurePolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraSource {
    /// V4L2 device `/dev/video<device-id>`
    Device,
    /// Synthetic colour bars, no hardware needed
    TestPattern,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraConfig {
    #[serde(default = "default_source")]
    pub source: CameraSource,

    #[serde(default)]
    pub device_id: u32,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Pacing of the test pattern source
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Mirror frames horizontally before detection
    #[serde(default = "default_true")]
    pub mirror: bool,

    /// Stop after this many frames (test pattern only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_limit: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            device_id: 0,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            mirror: true,
            frame_limit: None,
        }
    }
}

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetectorConfig {
    /// `auto` picks from the model extension, `none` disables inference
    #[serde(default)]
    pub backend: DetectorBackend,

    #[serde(default = "default_model")]
    pub model: PathBuf,

    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    #[serde(default)]
    pub enable_edgetpu: bool,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// What a failed detect/annotate call does to the worker
    #[serde(default)]
    pub on_error: FailurePolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::default(),
            model: default_model(),
            num_threads: default_num_threads(),
            enable_edgetpu: false,
            max_results: default_max_results(),
            score_threshold: default_score_threshold(),
            on_error: FailurePolicy::default(),
        }
    }
}

impl DetectorConfig {
    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter {
            max_results: self.max_results,
            score_threshold: self.score_threshold,
        }
    }

    pub fn options(&self) -> DetectorOptions {
        DetectorOptions {
            backend: self.backend,
            model_path: self.model.clone(),
            num_threads: self.num_threads,
            enable_edgetpu: self.enable_edgetpu,
            filter: self.filter(),
        }
    }
}

/// Frame production configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StreamConfig {
    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Frames per FPS estimate window
    #[serde(default = "default_fps_window")]
    pub fps_window: u32,

    /// Draw the FPS estimate onto streamed frames
    #[serde(default = "default_true")]
    pub overlay_fps: bool,

    /// Log worker statistics every N captured frames (0 = never)
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            fps_window: default_fps_window(),
            overlay_fps: true,
            stats_interval: default_stats_interval(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_bind_ip")]
    pub ip: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Concurrent `/video_feed` viewers, unlimited when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_clients: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_bind_ip(),
            port: default_port(),
            max_clients: None,
        }
    }
}

// Default value functions
fn default_source() -> CameraSource {
    CameraSource::Device
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_true() -> bool {
    true
}
fn default_model() -> PathBuf {
    PathBuf::from("yolov8n.onnx")
}
fn default_num_threads() -> usize {
    4
}
fn default_max_results() -> usize {
    3
}
fn default_score_threshold() -> f32 {
    0.3
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_fps_window() -> u32 {
    10
}
fn default_stats_interval() -> u64 {
    100
}
fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file without validating it, for callers that layer
    /// overrides on top before calling [`Config::validate`]
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Reads `path` unvalidated when given, defaults otherwise
    pub fn read_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => Ok(Self::default()),
        }
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera: width and height must be > 0, got {}x{}",
                cam.width, cam.height
            )));
        }

        if cam.source == CameraSource::TestPattern && cam.fps == 0 {
            return Err(ConfigError::Invalid(
                "camera: test pattern fps must be > 0".to_string(),
            ));
        }

        let det = &self.detector;
        if det.num_threads == 0 {
            return Err(ConfigError::Invalid(
                "detector: num-threads must be > 0".to_string(),
            ));
        }

        if det.max_results == 0 {
            return Err(ConfigError::Invalid(
                "detector: max-results must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&det.score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector: score-threshold must be between 0 and 1, got {}",
                det.score_threshold
            )));
        }

        let stream = &self.stream;
        if stream.jpeg_quality == 0 || stream.jpeg_quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "stream: jpeg-quality must be between 1 and 100, got {}",
                stream.jpeg_quality
            )));
        }

        if stream.fps_window == 0 {
            return Err(ConfigError::Invalid(
                "stream: fps-window must be > 0".to_string(),
            ));
        }

        if self.server.max_clients == Some(0) {
            return Err(ConfigError::Invalid(
                "server: max-clients must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `ip:port` the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.ip, self.server.port)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    /// Parses and validates a TOML document
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
