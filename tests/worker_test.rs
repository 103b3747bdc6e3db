//! Detection worker behaviour with fake capabilities

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{Rgb, RgbImage};
use rpi_detect_streamer::annotate::AnnotateError;
use rpi_detect_streamer::camera::CameraError;
use rpi_detect_streamer::detection::DetectionError;
use rpi_detect_streamer::encode::EncodeError;
use rpi_detect_streamer::worker::{WorkerConfig, WorkerError, WorkerExit};
use rpi_detect_streamer::{
    Annotator, BoundingBox, Camera, Detection, DetectionWorker, Detector, FailurePolicy,
    FrameEncoder, FrameStore, PixelFormat, RawFrame,
};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;

enum Shot {
    Frame(RawFrame),
    Fail,
}

/// Plays back a fixed script, then reports exhaustion
struct ScriptedCamera {
    script: VecDeque<Shot>,
}

impl ScriptedCamera {
    fn frames(count: usize) -> Self {
        Self {
            script: (0..count).map(|i| Shot::Frame(solid_frame(i as u8))).collect(),
        }
    }

    fn then_fail(mut self) -> Self {
        self.script.push_back(Shot::Fail);
        self
    }
}

impl Camera for ScriptedCamera {
    fn capture(&mut self) -> Result<Option<RawFrame>, CameraError> {
        match self.script.pop_front() {
            Some(Shot::Frame(frame)) => Ok(Some(frame)),
            Some(Shot::Fail) => Err(CameraError::Read("device unplugged".to_string())),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

fn solid_frame(value: u8) -> RawFrame {
    RawFrame::new(
        vec![value; PixelFormat::Rgb8.frame_size(WIDTH, HEIGHT)],
        WIDTH,
        HEIGHT,
        PixelFormat::Rgb8,
    )
}

/// Fails on the listed call numbers (1-based), reports one person otherwise
struct FlakyDetector {
    calls: usize,
    fail_on: Vec<usize>,
}

impl FlakyDetector {
    fn reliable() -> Self {
        Self::failing_on(&[])
    }

    fn failing_on(calls: &[usize]) -> Self {
        Self {
            calls: 0,
            fail_on: calls.to_vec(),
        }
    }
}

impl Detector for FlakyDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        self.calls += 1;
        if self.fail_on.contains(&self.calls) {
            return Err(DetectionError::Inference("model exploded".to_string()));
        }
        Ok(vec![Detection::new(
            BoundingBox::new(1, 1, 4, 4),
            "person",
            0.8,
        )])
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

struct FailingAnnotator;

impl Annotator for FailingAnnotator {
    fn annotate(
        &mut self,
        _image: RgbImage,
        _detections: &[Detection],
    ) -> Result<RgbImage, AnnotateError> {
        Err(AnnotateError::EmptyImage {
            width: 0,
            height: 0,
        })
    }
}

/// Rejects every other frame
struct AlternatingEncoder {
    calls: usize,
}

impl FrameEncoder for AlternatingEncoder {
    fn encode(&mut self, _image: &RgbImage) -> Result<Bytes, EncodeError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            Err(EncodeError::EmptyImage {
                width: 0,
                height: 0,
            })
        } else {
            Ok(Bytes::from(vec![0xFF, 0xD8, self.calls as u8, 0xFF, 0xD9]))
        }
    }
}

fn config(on_error: FailurePolicy) -> WorkerConfig {
    WorkerConfig {
        on_error,
        stats_interval: 0,
        overlay_fps: false,
        ..WorkerConfig::default()
    }
}

fn run(worker: &mut DetectionWorker) -> Result<WorkerExit, WorkerError> {
    worker.run(&AtomicBool::new(true))
}

#[test]
fn test_publishes_every_frame_then_exhausts() {
    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(4)),
        Box::new(FlakyDetector::reliable()),
        Arc::clone(&store),
        config(FailurePolicy::Fatal),
    );

    assert_eq!(run(&mut worker).unwrap(), WorkerExit::Exhausted);
    assert_eq!(store.published_count(), 4);

    let frame = store.get().unwrap();
    assert_eq!(frame.sequence, 4);
    assert_eq!(frame.detections[0].label, "person");
    let decoded = image::load_from_memory(&frame.jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
}

#[test]
fn test_capture_failure_is_fatal() {
    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(2).then_fail()),
        Box::new(FlakyDetector::reliable()),
        Arc::clone(&store),
        // Even the lenient policy does not cover the camera
        config(FailurePolicy::Skip),
    );

    let err = run(&mut worker).unwrap_err();
    assert!(matches!(err, WorkerError::Capture(CameraError::Read(_))));
    assert_eq!(store.published_count(), 2);
}

#[test]
fn test_detector_failure_fatal_policy() {
    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(5)),
        Box::new(FlakyDetector::failing_on(&[3])),
        Arc::clone(&store),
        config(FailurePolicy::Fatal),
    );

    let err = run(&mut worker).unwrap_err();
    assert!(matches!(err, WorkerError::Detection(_)));
    assert_eq!(store.published_count(), 2);
}

#[test]
fn test_detector_failure_skip_policy() {
    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(5)),
        Box::new(FlakyDetector::failing_on(&[2, 4])),
        Arc::clone(&store),
        config(FailurePolicy::Skip),
    );

    assert_eq!(run(&mut worker).unwrap(), WorkerExit::Exhausted);
    assert_eq!(store.published_count(), 3);

    let stats = worker.stats();
    assert_eq!(stats.frames_captured, 5);
    assert_eq!(stats.detect_failures, 2);
}

#[test]
fn test_annotator_failure_follows_policy() {
    let fatal_store = Arc::new(FrameStore::new());
    let mut fatal = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(2)),
        Box::new(FlakyDetector::reliable()),
        Arc::clone(&fatal_store),
        config(FailurePolicy::Fatal),
    )
    .with_annotator(Box::new(FailingAnnotator));
    assert!(matches!(run(&mut fatal), Err(WorkerError::Annotate(_))));
    assert!(fatal_store.get().is_none());

    let skip_store = Arc::new(FrameStore::new());
    let mut skip = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(2)),
        Box::new(FlakyDetector::reliable()),
        Arc::clone(&skip_store),
        config(FailurePolicy::Skip),
    )
    .with_annotator(Box::new(FailingAnnotator));
    assert_eq!(run(&mut skip).unwrap(), WorkerExit::Exhausted);
    assert_eq!(skip.stats().annotate_failures, 2);
    assert!(skip_store.get().is_none());
}

#[test]
fn test_encode_failure_skips_publish() {
    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        Box::new(ScriptedCamera::frames(4)),
        Box::new(FlakyDetector::reliable()),
        Arc::clone(&store),
        config(FailurePolicy::Fatal),
    )
    .with_encoder(Box::new(AlternatingEncoder { calls: 0 }));

    assert_eq!(run(&mut worker).unwrap(), WorkerExit::Exhausted);
    assert_eq!(store.published_count(), 2);
    assert_eq!(worker.stats().encode_failures, 2);
    // Third encode was the last successful one
    assert_eq!(store.get().unwrap().jpeg[2], 3);
}

#[test]
fn test_mirror_flips_before_detection() {
    struct LeftEdgeDetector;

    impl Detector for LeftEdgeDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
            // Report the colour of the top-left pixel through the label
            let Rgb([r, _, _]) = *image.get_pixel(0, 0);
            Ok(vec![Detection::new(
                BoundingBox::new(0, 0, 1, 1),
                r.to_string(),
                1.0,
            )])
        }

        fn name(&self) -> &str {
            "left-edge"
        }
    }

    let mut data = vec![0u8; PixelFormat::Rgb8.frame_size(WIDTH, HEIGHT)];
    // Paint the right-most column red
    for y in 0..HEIGHT as usize {
        data[(y * WIDTH as usize + WIDTH as usize - 1) * 3] = 200;
    }
    let camera = ScriptedCamera {
        script: VecDeque::from([Shot::Frame(RawFrame::new(
            data,
            WIDTH,
            HEIGHT,
            PixelFormat::Rgb8,
        ))]),
    };

    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        Box::new(camera),
        Box::new(LeftEdgeDetector),
        Arc::clone(&store),
        config(FailurePolicy::Fatal),
    );
    run(&mut worker).unwrap();

    assert_eq!(store.get().unwrap().detections[0].label, "200");
}

#[test]
fn test_spawned_worker_stops_on_request() {
    struct EndlessCamera;

    impl Camera for EndlessCamera {
        fn capture(&mut self) -> Result<Option<RawFrame>, CameraError> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(Some(solid_frame(7)))
        }

        fn describe(&self) -> String {
            "endless".to_string()
        }
    }

    let store = Arc::new(FrameStore::new());
    let running = Arc::new(AtomicBool::new(true));
    let handle = DetectionWorker::new(
        Box::new(EndlessCamera),
        Box::new(FlakyDetector::reliable()),
        Arc::clone(&store),
        config(FailurePolicy::Fatal),
    )
    .spawn(Arc::clone(&running))
    .unwrap();

    while store.published_count() < 3 {
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.stop();

    assert!(!running.load(Ordering::Relaxed));
    assert_eq!(handle.join().unwrap(), WorkerExit::Stopped);
}

/// Default build, `--testPattern`, default model: the pipeline must come up
/// and stream frames even without an inference runtime compiled in
#[cfg(not(feature = "onnx"))]
#[test]
fn test_test_pattern_runs_with_default_detector() {
    use rpi_detect_streamer::config::{CameraSource, Config};
    use rpi_detect_streamer::{camera, detection};

    let mut config = Config::default();
    config.camera.source = CameraSource::TestPattern;
    config.camera.width = 64;
    config.camera.height = 48;
    config.camera.fps = 200;
    config.camera.frame_limit = Some(4);
    config.validate().unwrap();

    let detector = detection::load(&config.detector.options()).unwrap();
    assert_eq!(detector.name(), "none");
    let camera = camera::open(&config.camera).unwrap();

    let store = Arc::new(FrameStore::new());
    let mut worker = DetectionWorker::new(
        camera,
        detector,
        Arc::clone(&store),
        WorkerConfig::from(&config),
    );

    assert_eq!(run(&mut worker).unwrap(), WorkerExit::Exhausted);
    assert_eq!(store.published_count(), 4);
    let latest = store.get().unwrap();
    assert!(latest.detections.is_empty());
    assert!(image::load_from_memory(&latest.jpeg).is_ok());
}
