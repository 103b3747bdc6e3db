//! Camera object detection with a live MJPEG stream
//!
//! A single detection worker captures frames, runs the detector, draws the
//! results and publishes the JPEG into a [`FrameStore`]. Any number of HTTP
//! viewers pull the freshest frame from the store at their own pace:
//! - Last-write-wins frame slot, no per-client queue
//! - Publish notification instead of busy-polling
//! - Explicit start/stop lifecycle for the worker and the server
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpi_detect_streamer::FrameStore;
//!
//! let store = Arc::new(FrameStore::new());
//! assert!(store.get().is_none());
//! ```

pub mod annotate;
pub mod camera;
pub mod cli;
pub mod config;
pub mod detection;
pub mod encode;
pub mod fps;
pub mod frame_store;
pub mod server;
pub mod single_shot;
pub mod telemetry;
pub mod worker;

// Re-exports for convenience
pub use annotate::{Annotator, BoxAnnotator};
pub use camera::{Camera, PixelFormat, RawFrame};
pub use config::Config;
pub use detection::{BoundingBox, Detection, DetectionFilter, Detector, DetectorBackend, NullDetector};
pub use encode::{FrameEncoder, JpegEncoder};
pub use fps::FpsEstimator;
pub use frame_store::{AnnotatedFrame, FrameStore, FrameSubscriber};
pub use server::{StreamServer, StreamServerConfig};
pub use worker::{DetectionWorker, FailurePolicy, WorkerHandle};
