//! ONNX Runtime detector for YOLOv8-style models
//!
//! Expects a single `[1, 3, S, S]` float input and a `[1, 4 + C, N]` output
//! of centre-format boxes followed by per-class scores.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array, ArrayView, IxDyn};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use tracing::{debug, info, warn};

use super::{
    coco_label, non_max_suppression, BoundingBox, Detection, DetectionError, DetectionFilter,
    Detector, DetectorOptions,
};

const INPUT_SIZE: u32 = 640;
const NMS_IOU_THRESHOLD: f32 = 0.45;

pub struct OnnxDetector {
    session: Session,
    filter: DetectionFilter,
}

impl OnnxDetector {
    pub fn new(options: &DetectorOptions) -> Result<Self, DetectionError> {
        if options.enable_edgetpu {
            warn!("EdgeTPU delegate is not available for ONNX models, running on CPU");
        }

        let session = Session::builder()
            .map_err(|e| DetectionError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectionError::ModelLoad(e.to_string()))?
            .with_intra_threads(options.num_threads.max(1))
            .map_err(|e| DetectionError::ModelLoad(e.to_string()))?
            .commit_from_file(&options.model_path)
            .map_err(|e| {
                DetectionError::ModelLoad(format!(
                    "{}: {}",
                    options.model_path.display(),
                    e
                ))
            })?;

        info!(model = %options.model_path.display(), "ONNX model loaded");

        Ok(Self {
            session,
            filter: options.filter,
        })
    }

    /// Resize to the model input, scale to [0, 1], CHW layout
    fn preprocess(&self, image: &RgbImage) -> Array<f32, IxDyn> {
        let resized =
            image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let side = INPUT_SIZE as usize;
        let mut input = Array::zeros((1, 3, side, side));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
            input[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
            input[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
        }

        input.into_dyn()
    }

    fn postprocess(
        &self,
        output: ArrayView<f32, IxDyn>,
        orig_w: u32,
        orig_h: u32,
    ) -> Result<Vec<Detection>, DetectionError> {
        let shape = output.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(DetectionError::Inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }

        let num_classes = shape[1] - 4;
        let num_boxes = shape[2];
        let scale_x = orig_w as f32 / INPUT_SIZE as f32;
        let scale_y = orig_h as f32 / INPUT_SIZE as f32;

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            let (class_id, score) = (0..num_classes)
                .map(|c| (c, output[[0, 4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < self.filter.score_threshold {
                continue;
            }

            let cx = output[[0, 0, i]] * scale_x;
            let cy = output[[0, 1, i]] * scale_y;
            let w = output[[0, 2, i]] * scale_x;
            let h = output[[0, 3, i]] * scale_y;

            let x = (cx - w / 2.0).clamp(0.0, orig_w as f32);
            let y = (cy - h / 2.0).clamp(0.0, orig_h as f32);
            let w = w.min(orig_w as f32 - x);
            let h = h.min(orig_h as f32 - y);

            candidates.push(Detection::new(
                BoundingBox::new(x.round() as i32, y.round() as i32, w.round() as i32, h.round() as i32),
                coco_label(class_id),
                score,
            ));
        }

        let kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD);
        Ok(self.filter.apply(kept))
    }
}

impl Detector for OnnxDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        debug!(width = image.width(), height = image.height(), "Running ONNX inference");

        let input = self.preprocess(image);
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?
            .into_owned();
        drop(outputs);

        self.postprocess(output.view(), image.width(), image.height())
    }

    fn name(&self) -> &str {
        "onnx-yolov8"
    }
}
