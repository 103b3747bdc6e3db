//! Still-image detection end to end

use image::{Rgb, RgbImage};
use rpi_detect_streamer::detection::{self, DetectionError, DetectorBackend, DetectorOptions};
use rpi_detect_streamer::single_shot::{self, SingleShotError};
use rpi_detect_streamer::{BoundingBox, BoxAnnotator, Detection, DetectionFilter, Detector};

/// Returns more detections than the filter lets through
struct CrowdDetector;

impl Detector for CrowdDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        Ok(vec![
            Detection::new(BoundingBox::new(10, 20, 30, 40), "person", 0.91),
            Detection::new(BoundingBox::new(50, 10, 20, 20), "dog", 0.64),
            Detection::new(BoundingBox::new(0, 0, 5, 5), "cup", 0.2),
            Detection::new(BoundingBox::new(5, 5, 5, 5), "chair", 0.55),
            Detection::new(BoundingBox::new(8, 8, 5, 5), "book", 0.4),
        ])
    }

    fn name(&self) -> &str {
        "crowd"
    }
}

#[test]
fn test_report_lines_from_bmp() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bmp");
    RgbImage::from_pixel(96, 72, Rgb([90, 90, 90]))
        .save(&input)
        .unwrap();

    let image = single_shot::load_image(&input).unwrap();
    let report = single_shot::run(
        &mut CrowdDetector,
        &mut BoxAnnotator::default(),
        image,
        &DetectionFilter::default(),
        None,
    )
    .unwrap();

    let text = report.to_string();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "0.910000: person @ x1=10 y1=20 x2=40 y2=60");
    assert_eq!(lines[1], "0.640000: dog @ x1=50 y1=10 x2=70 y2=30");
    assert_eq!(lines[2], "0.550000: chair @ x1=5 y1=5 x2=10 y2=10");
    assert!(lines[3].starts_with("time: "));
    assert!(lines[3].ends_with("ms"));
}

#[test]
fn test_annotated_output_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result.png");

    single_shot::run(
        &mut CrowdDetector,
        &mut BoxAnnotator::default(),
        RgbImage::from_pixel(96, 72, Rgb([0, 0, 0])),
        &DetectionFilter::default(),
        Some(&output),
    )
    .unwrap();

    let written = single_shot::load_image(&output).unwrap();
    assert_eq!(*written.get_pixel(10, 20), Rgb([255, 0, 0]));
}

#[test]
fn test_missing_image_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = single_shot::load_image(dir.path().join("nope.bmp"));
    assert!(matches!(result, Err(SingleShotError::Image(_))));
}

#[test]
fn test_tflite_model_rejected() {
    let options = DetectorOptions {
        backend: DetectorBackend::Auto,
        model_path: "efficientdet_lite0.tflite".into(),
        num_threads: 4,
        enable_edgetpu: false,
        filter: DetectionFilter::default(),
    };
    assert!(matches!(
        detection::load(&options),
        Err(DetectionError::Unsupported { .. })
    ));
}
