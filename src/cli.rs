//! Command line for `detect-stream`
//!
//! Settings resolve in three layers: built-in defaults, then the config
//! file, then flags. Validation runs once on the merged result.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{CameraSource, Config, ConfigError};
use crate::detection::DetectorBackend;
use crate::worker::FailurePolicy;

#[derive(Parser, Debug)]
#[command(name = "detect-stream")]
#[command(about = "Run object detection on a camera and stream the annotated video over HTTP")]
#[command(version)]
pub struct StreamArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path of the object detection model
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Inference backend, `none` streams without detection
    #[arg(long = "detectorBackend", value_enum)]
    pub detector_backend: Option<DetectorBackend>,

    /// Id of the camera (/dev/video<id>)
    #[arg(long = "cameraId")]
    pub camera_id: Option<u32>,

    /// Width of frames to capture from the camera
    #[arg(long = "frameWidth")]
    pub frame_width: Option<u32>,

    /// Height of frames to capture from the camera
    #[arg(long = "frameHeight")]
    pub frame_height: Option<u32>,

    /// Number of CPU threads to run the model
    #[arg(long = "numThreads")]
    pub num_threads: Option<usize>,

    /// Run the model on an EdgeTPU
    #[arg(long = "enableEdgeTPU")]
    pub enable_edgetpu: bool,

    /// IP address to listen on
    #[arg(short, long)]
    pub ip: Option<String>,

    /// Port to listen on
    #[arg(short = 'o', long)]
    pub port: Option<u16>,

    /// Use the synthetic test pattern instead of a camera
    #[arg(long = "testPattern")]
    pub test_pattern: bool,

    /// Maximum concurrent stream viewers
    #[arg(long = "maxClients")]
    pub max_clients: Option<usize>,

    /// What a detector or annotator failure does
    #[arg(long = "onDetectorError", value_enum)]
    pub on_detector_error: Option<FailurePolicy>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl StreamArgs {
    /// Flags given on the command line override `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.detector.model = model.clone();
        }
        if let Some(backend) = self.detector_backend {
            config.detector.backend = backend;
        }
        if let Some(id) = self.camera_id {
            config.camera.device_id = id;
        }
        if let Some(width) = self.frame_width {
            config.camera.width = width;
        }
        if let Some(height) = self.frame_height {
            config.camera.height = height;
        }
        if let Some(threads) = self.num_threads {
            config.detector.num_threads = threads;
        }
        if self.enable_edgetpu {
            config.detector.enable_edgetpu = true;
        }
        if let Some(ip) = &self.ip {
            config.server.ip = ip.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.test_pattern {
            config.camera.source = CameraSource::TestPattern;
        }
        if let Some(max) = self.max_clients {
            config.server.max_clients = Some(max);
        }
        if let Some(policy) = self.on_detector_error {
            config.detector.on_error = policy;
        }
    }

    /// Defaults, then the file named by `--config`, then flags, then validate
    pub fn resolve_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::read_or_default(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}
