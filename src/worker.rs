//! Background capture → detect → annotate → publish loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::imageops;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::annotate::{draw_fps_overlay, AnnotateError, Annotator, BoxAnnotator};
use crate::camera::{Camera, CameraError};
use crate::config::Config;
use crate::detection::{DetectionError, DetectionFilter, Detector};
use crate::encode::{FrameEncoder, JpegEncoder};
use crate::fps::FpsEstimator;
use crate::frame_store::{AnnotatedFrame, FrameStore};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("camera capture failed: {0}")]
    Capture(#[from] CameraError),

    #[error("detector failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("annotator failed: {0}")]
    Annotate(#[from] AnnotateError),

    #[error("worker thread panicked")]
    Panicked,
}

/// What a detector or annotator failure does to the loop
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the worker and surface the error
    #[default]
    Fatal,
    /// Drop the frame, log, and carry on with the next capture
    Skip,
}

/// Why the loop ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stop was requested
    Stopped,
    /// Camera reported no more frames
    Exhausted,
}

/// Tunables for the detection loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub mirror: bool,
    pub filter: DetectionFilter,
    pub on_error: FailurePolicy,
    pub jpeg_quality: u8,
    pub fps_window: u32,
    pub overlay_fps: bool,
    /// Log statistics every N captures (0 = never)
    pub stats_interval: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig::from(&Config::default())
    }
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            mirror: config.camera.mirror,
            filter: config.detector.filter(),
            on_error: config.detector.on_error,
            jpeg_quality: config.stream.jpeg_quality,
            fps_window: config.stream.fps_window,
            overlay_fps: config.stream.overlay_fps,
            stats_interval: config.stream.stats_interval,
        }
    }
}

/// Counters kept by the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames_captured: u64,
    pub frames_published: u64,
    pub detect_failures: u64,
    pub annotate_failures: u64,
    pub encode_failures: u64,
}

/// The single producer feeding a [`FrameStore`]
pub struct DetectionWorker {
    camera: Box<dyn Camera>,
    detector: Box<dyn Detector>,
    annotator: Box<dyn Annotator>,
    encoder: Box<dyn FrameEncoder>,
    store: Arc<FrameStore>,
    fps: FpsEstimator,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl DetectionWorker {
    /// Worker with the stock box annotator and JPEG encoder
    pub fn new(
        camera: Box<dyn Camera>,
        detector: Box<dyn Detector>,
        store: Arc<FrameStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            camera,
            detector,
            annotator: Box::new(BoxAnnotator::default()),
            encoder: Box::new(JpegEncoder::new(config.jpeg_quality)),
            store,
            fps: FpsEstimator::new(config.fps_window),
            config,
            stats: WorkerStats::default(),
        }
    }

    pub fn with_annotator(mut self, annotator: Box<dyn Annotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Run until the camera is exhausted, `running` is cleared, or a fatal
    /// error occurs
    pub fn run(&mut self, running: &AtomicBool) -> Result<WorkerExit, WorkerError> {
        info!(
            camera = %self.camera.describe(),
            detector = %self.detector.name(),
            policy = ?self.config.on_error,
            "Detection worker started"
        );

        let exit = loop {
            if !running.load(Ordering::Relaxed) {
                break WorkerExit::Stopped;
            }

            match self.step() {
                Ok(true) => {}
                Ok(false) => break WorkerExit::Exhausted,
                Err(e) => {
                    error!(error = %e, "Detection worker failed");
                    return Err(e);
                }
            }
        };

        info!(
            exit = ?exit,
            frames_captured = self.stats.frames_captured,
            frames_published = self.stats.frames_published,
            "Detection worker finished"
        );
        Ok(exit)
    }

    /// One iteration. Returns `Ok(false)` once the camera is exhausted.
    pub fn step(&mut self) -> Result<bool, WorkerError> {
        let Some(raw) = self.camera.capture()? else {
            return Ok(false);
        };
        self.stats.frames_captured += 1;

        let mut image = raw.to_rgb()?;
        if self.config.mirror {
            imageops::flip_horizontal_in_place(&mut image);
        }

        let detections = match self.detector.detect(&image) {
            Ok(detections) => self.config.filter.apply(detections),
            Err(e) => {
                self.stats.detect_failures += 1;
                self.handle_failure(WorkerError::Detection(e))?;
                return Ok(true);
            }
        };

        let mut annotated = match self.annotator.annotate(image, &detections) {
            Ok(annotated) => annotated,
            Err(e) => {
                self.stats.annotate_failures += 1;
                self.handle_failure(WorkerError::Annotate(e))?;
                return Ok(true);
            }
        };

        let fps = self.fps.tick();
        if self.config.overlay_fps {
            draw_fps_overlay(&mut annotated, fps);
        }

        match self.encoder.encode(&annotated) {
            Ok(jpeg) => {
                let frame = AnnotatedFrame::new(jpeg, raw.captured_at)
                    .with_fps(fps)
                    .with_detections(detections);
                self.store.publish(frame);
                self.stats.frames_published += 1;
            }
            Err(e) => {
                self.stats.encode_failures += 1;
                warn!(error = %e, "Frame encode failed, skipping");
            }
        }

        self.log_stats();
        Ok(true)
    }

    fn handle_failure(&self, err: WorkerError) -> Result<(), WorkerError> {
        match self.config.on_error {
            FailurePolicy::Fatal => Err(err),
            FailurePolicy::Skip => {
                warn!(error = %err, "Skipping frame");
                Ok(())
            }
        }
    }

    fn log_stats(&self) {
        let interval = self.config.stats_interval;
        if interval == 0 || self.stats.frames_captured % interval != 0 {
            return;
        }

        info!(
            frames_captured = self.stats.frames_captured,
            frames_published = self.stats.frames_published,
            skipped = self.stats.detect_failures
                + self.stats.annotate_failures
                + self.stats.encode_failures,
            fps = %format!("{:.1}", self.fps.fps()),
            clients = self.store.subscriber_count(),
            "Worker stats"
        );
    }

    /// Move the worker onto its own thread
    ///
    /// The store is left open when the loop ends, so viewers keep the last
    /// frame until the owner closes it.
    pub fn spawn(mut self, running: Arc<AtomicBool>) -> std::io::Result<WorkerHandle> {
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("detection-worker".to_string())
            .spawn(move || self.run(&flag))?;

        Ok(WorkerHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Owner of a spawned worker thread
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<WorkerExit, WorkerError>>>,
}

impl WorkerHandle {
    /// Ask the loop to stop after the current iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Wait for the thread and return how the loop ended
    pub fn join(mut self) -> Result<WorkerExit, WorkerError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| WorkerError::Panicked)?,
            None => Ok(WorkerExit::Stopped),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop();
            let _ = thread.join();
        }
    }
}
