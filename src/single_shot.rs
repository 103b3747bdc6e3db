//! One detection pass over a still image

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::annotate::{AnnotateError, Annotator};
use crate::detection::{Detection, DetectionError, DetectionFilter, Detector};

#[derive(Error, Debug)]
pub enum SingleShotError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Annotate(#[from] AnnotateError),
}

/// Result of a single-shot run
#[derive(Debug, Clone)]
pub struct SingleShotReport {
    pub detections: Vec<Detection>,
    /// Wall time of the detect call alone
    pub inference_time: Duration,
}

impl SingleShotReport {
    pub fn inference_ms(&self) -> f64 {
        self.inference_time.as_secs_f64() * 1000.0
    }
}

impl fmt::Display for SingleShotReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for detection in &self.detections {
            writeln!(f, "{}", detection)?;
        }
        write!(f, "time: {:.3}ms", self.inference_ms())
    }
}

/// Load any supported image file as RGB
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage, SingleShotError> {
    let path = path.as_ref();
    let image = image::open(path)?.to_rgb8();
    debug!(path = %path.display(), width = image.width(), height = image.height(), "Loaded image");
    Ok(image)
}

/// Detect once, then optionally annotate and write the result to `output`
pub fn run(
    detector: &mut dyn Detector,
    annotator: &mut dyn Annotator,
    image: RgbImage,
    filter: &DetectionFilter,
    output: Option<&Path>,
) -> Result<SingleShotReport, SingleShotError> {
    let start = Instant::now();
    let detections = filter.apply(detector.detect(&image)?);
    let inference_time = start.elapsed();

    if let Some(path) = output {
        let annotated = annotator.annotate(image, &detections)?;
        annotated.save(path)?;
        info!(path = %path.display(), "Wrote annotated image");
    }

    Ok(SingleShotReport {
        detections,
        inference_time,
    })
}
