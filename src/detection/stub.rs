use image::RgbImage;
use tracing::debug;

use super::{Detection, DetectionError, Detector};

/// Detector that never finds anything
///
/// Lets the capture, annotate and stream path run on builds or machines
/// without an inference backend.
#[derive(Debug, Default)]
pub struct NullDetector {
    frames: u64,
}

impl NullDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for NullDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        self.frames += 1;
        if self.frames == 1 {
            debug!(
                width = image.width(),
                height = image.height(),
                "Null detector running, no detections will be reported"
            );
        }
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}
