//! Object detection types and the detector capability

mod labels;
#[cfg(feature = "onnx")]
mod onnx;
mod stub;

pub use labels::{coco_label, COCO_LABELS};
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;
pub use stub::NullDetector;

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unsupported model '{path}': {reason}")]
    Unsupported { path: PathBuf, reason: String },
}

/// Axis-aligned box in pixel coordinates of the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(origin_x: i32, origin_y: i32, width: i32, height: i32) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }

    /// Bottom-right corner `(origin_x + width, origin_y + height)`,
    /// saturating at the `i32` range
    pub fn bottom_right(&self) -> (i32, i32) {
        (
            self.origin_x.saturating_add(self.width),
            self.origin_y.saturating_add(self.height),
        )
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    /// Intersection over union, 0 for disjoint or empty boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let (ax2, ay2) = self.bottom_right();
        let (bx2, by2) = other.bottom_right();

        let ix = (ax2.min(bx2) - self.origin_x.max(other.origin_x)).max(0);
        let iy = (ay2.min(by2) - self.origin_y.max(other.origin_y)).max(0);
        let intersection = i64::from(ix) * i64::from(iy);
        let union = self.area() + other.area() - intersection;

        if union <= 0 {
            0.0
        } else {
            intersection as f32 / union as f32
        }
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub label: String,
    pub score: f32,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, label: impl Into<String>, score: f32) -> Self {
        Self {
            bounding_box,
            label: label.into(),
            score,
        }
    }
}

/// Report line: `0.876543: person @ x1=10 y1=20 x2=40 y2=60`
impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x2, y2) = self.bounding_box.bottom_right();
        write!(
            f,
            "{:08.6}: {} @ x1={} y1={} x2={} y2={}",
            self.score, self.label, self.bounding_box.origin_x, self.bounding_box.origin_y, x2, y2
        )
    }
}

/// Result limits applied to every detector output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionFilter {
    pub max_results: usize,
    pub score_threshold: f32,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            max_results: 3,
            score_threshold: 0.3,
        }
    }
}

impl DetectionFilter {
    /// Drop results under the threshold and keep at most `max_results`,
    /// preserving the detector's order
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|d| d.score >= self.score_threshold)
            .take(self.max_results)
            .collect()
    }
}

/// Which inference backend [`load`] builds
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorBackend {
    /// Pick from the model extension; fall back to [`NullDetector`] when
    /// the build has no runtime for it
    #[default]
    Auto,
    /// ONNX Runtime, error if not compiled in
    Onnx,
    /// No inference, frames stream without detections
    #[serde(rename = "none")]
    #[value(name = "none")]
    Disabled,
}

/// Detector construction options
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub backend: DetectorBackend,
    pub model_path: PathBuf,
    pub num_threads: usize,
    pub enable_edgetpu: bool,
    pub filter: DetectionFilter,
}

/// Object detection capability
///
/// Takes an RGB image and returns detections ordered as the model ranks
/// them, in pixel coordinates of that image.
pub trait Detector: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError>;

    /// Detector name (for logging)
    fn name(&self) -> &str;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        (**self).detect(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Load the detector selected by `options.backend`
///
/// With [`DetectorBackend::Auto`] the backend is picked from the model file
/// extension.
pub fn load(options: &DetectorOptions) -> Result<Box<dyn Detector>, DetectionError> {
    let path = options.model_path.as_path();

    if options.backend == DetectorBackend::Disabled {
        info!("Detection disabled, using null detector");
        return Ok(Box::new(NullDetector::new()));
    }

    info!(
        backend = ?options.backend,
        model = %path.display(),
        threads = options.num_threads,
        edgetpu = options.enable_edgetpu,
        "Loading detector"
    );

    match extension(path).as_deref() {
        Some("onnx") if options.backend == DetectorBackend::Auto && !cfg!(feature = "onnx") => {
            warn!(
                model = %path.display(),
                "Built without ONNX support, streaming without detections"
            );
            Ok(Box::new(NullDetector::new()))
        }
        Some("onnx") => load_onnx(options),
        Some(other) => Err(DetectionError::Unsupported {
            path: path.to_path_buf(),
            reason: format!("no backend for .{} models, convert the model to ONNX", other),
        }),
        None => Err(DetectionError::Unsupported {
            path: path.to_path_buf(),
            reason: "model file has no extension".to_string(),
        }),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(feature = "onnx")]
fn load_onnx(options: &DetectorOptions) -> Result<Box<dyn Detector>, DetectionError> {
    Ok(Box::new(OnnxDetector::new(options)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(options: &DetectorOptions) -> Result<Box<dyn Detector>, DetectionError> {
    Err(DetectionError::Unsupported {
        path: options.model_path.clone(),
        reason: "built without ONNX support, rebuild with --features onnx".to_string(),
    })
}

/// Greedy non-maximum suppression, highest score first
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = kept.iter().any(|k| {
            k.label == candidate.label && k.bounding_box.iou(&candidate.bounding_box) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(score: f32) -> Detection {
        Detection::new(BoundingBox::new(0, 0, 10, 10), "person", score)
    }

    #[test]
    fn test_bottom_right() {
        let bbox = BoundingBox::new(10, 20, 30, 40);
        assert_eq!(bbox.bottom_right(), (40, 60));
    }

    #[test]
    fn test_report_line() {
        let d = Detection::new(BoundingBox::new(10, 20, 30, 40), "person", 0.75);
        assert_eq!(d.to_string(), "0.750000: person @ x1=10 y1=20 x2=40 y2=60");
    }

    #[test]
    fn test_filter_threshold_and_limit() {
        let filter = DetectionFilter {
            max_results: 2,
            score_threshold: 0.3,
        };
        let kept = filter.apply(vec![det(0.9), det(0.2), det(0.5), det(0.4)]);
        let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20, 20, 5, 5)), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_overlapping() {
        let strong = Detection::new(BoundingBox::new(0, 0, 10, 10), "cat", 0.9);
        let weak = Detection::new(BoundingBox::new(1, 1, 10, 10), "cat", 0.6);
        let other = Detection::new(BoundingBox::new(1, 1, 10, 10), "dog", 0.5);

        let kept = non_max_suppression(vec![weak, strong.clone(), other], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], strong);
        assert_eq!(kept[1].label, "dog");
    }

    fn options(backend: DetectorBackend, model: &str) -> DetectorOptions {
        DetectorOptions {
            backend,
            model_path: PathBuf::from(model),
            num_threads: 4,
            enable_edgetpu: false,
            filter: DetectionFilter::default(),
        }
    }

    #[test]
    fn test_bottom_right_saturates() {
        let bbox = BoundingBox::new(i32::MAX - 5, i32::MIN + 1, 100, -100);
        assert_eq!(bbox.bottom_right(), (i32::MAX, i32::MIN));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(matches!(
            load(&options(DetectorBackend::Auto, "efficientdet_lite0.tflite")),
            Err(DetectionError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_none_backend_ignores_model() {
        let mut detector = load(&options(DetectorBackend::Disabled, "missing.tflite")).unwrap();
        assert_eq!(detector.name(), "none");
        assert!(detector.detect(&RgbImage::new(8, 8)).unwrap().is_empty());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_auto_falls_back_without_onnx() {
        let detector = load(&options(DetectorBackend::Auto, "yolov8n.onnx")).unwrap();
        assert_eq!(detector.name(), "none");
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_explicit_onnx_requires_feature() {
        assert!(matches!(
            load(&options(DetectorBackend::Onnx, "yolov8n.onnx")),
            Err(DetectionError::Unsupported { .. })
        ));
    }
}
