//! UltraFace (RFB-320) face detector via ONNX Runtime.
//!
//! The exported graph already decodes its anchors into normalized corner
//! boxes, so the host side only filters by score, runs NMS, and maps boxes
//! back into frame pixels.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ULTRAFACE_INPUT_WIDTH: u32 = 320;
const ULTRAFACE_INPUT_HEIGHT: u32 = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
const ULTRAFACE_CONFIDENCE_THRESHOLD: f32 = 0.7;
const ULTRAFACE_NMS_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// UltraFace-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Output indices of the `scores` and `boxes` tensors.
    scores_idx: usize,
    boxes_idx: usize,
}

impl FaceDetector {
    /// Load the UltraFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded UltraFace model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "UltraFace model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let (scores_idx, boxes_idx) = discover_output_indices(&output_names);

        Ok(Self {
            session,
            scores_idx,
            boxes_idx,
        })
    }

    /// Detect faces in an RGB frame, returning boxes sorted by confidence.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let input = preprocess(frame);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[self.scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[self.boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = decode(
            scores,
            boxes,
            frame.width(),
            frame.height(),
            ULTRAFACE_CONFIDENCE_THRESHOLD,
        );
        let faces = nms(candidates, ULTRAFACE_NMS_THRESHOLD);

        tracing::debug!(faces = faces.len(), "face detection finished");
        Ok(faces)
    }

    /// Detect the single most confident face, if any.
    pub fn detect_single(
        &mut self,
        frame: &RgbImage,
    ) -> Result<Option<BoundingBox>, DetectorError> {
        Ok(self.detect(frame)?.into_iter().next())
    }
}

/// Stretch an RGB frame to the model input and normalize into NCHW.
fn preprocess(frame: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(
        frame,
        ULTRAFACE_INPUT_WIDTH,
        ULTRAFACE_INPUT_HEIGHT,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((
        1,
        3,
        ULTRAFACE_INPUT_HEIGHT as usize,
        ULTRAFACE_INPUT_WIDTH as usize,
    ));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        }
    }

    tensor
}

/// Find the `scores` and `boxes` outputs by name, else assume `[scores, boxes]`.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");

    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(
                ?names,
                "UltraFace: output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Turn raw `scores [N,2]` and normalized `boxes [N,4]` into frame-space boxes.
fn decode(
    scores: &[f32],
    boxes: &[f32],
    width: u32,
    height: u32,
    threshold: f32,
) -> Vec<BoundingBox> {
    let count = (scores.len() / 2).min(boxes.len() / 4);
    let (w, h) = (width as f32, height as f32);

    (0..count)
        .filter_map(|idx| {
            // Column 0 is background, column 1 is face.
            let score = scores[idx * 2 + 1];
            if score <= threshold {
                return None;
            }

            let b = &boxes[idx * 4..idx * 4 + 4];
            let x1 = b[0].clamp(0.0, 1.0) * w;
            let y1 = b[1].clamp(0.0, 1.0) * h;
            let x2 = b[2].clamp(0.0, 1.0) * w;
            let y2 = b[3].clamp(0.0, 1.0) * h;
            if x2 <= x1 || y2 <= y1 {
                return None;
            }

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.3);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.3).is_empty());
    }

    #[test]
    fn test_decode_filters_and_scales() {
        // Three anchors: background, weak face, strong face.
        let scores = [0.9, 0.1, 0.4, 0.6, 0.05, 0.95];
        let boxes = [
            0.0, 0.0, 0.5, 0.5, //
            0.1, 0.1, 0.2, 0.2, //
            0.25, 0.5, 0.75, 1.0,
        ];
        let dets = decode(&scores, &boxes, 640, 480, 0.7);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert!((d.x - 160.0).abs() < 1e-3);
        assert!((d.y - 240.0).abs() < 1e-3);
        assert!((d.width - 320.0).abs() < 1e-3);
        assert!((d.height - 240.0).abs() < 1e-3);
        assert!((d.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_decode_clamps_and_drops_degenerate() {
        let scores = [0.0, 0.9, 0.0, 0.9];
        let boxes = [
            -0.2, -0.1, 1.3, 0.5, // spills past the frame
            0.6, 0.6, 0.4, 0.8, // x2 < x1
        ];
        let dets = decode(&scores, &boxes, 100, 100, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 0.0);
        assert_eq!(dets[0].y, 0.0);
        assert!((dets[0].width - 100.0).abs() < 1e-3);
        assert!((dets[0].height - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_truncated_outputs() {
        // A boxes tensor shorter than scores must not panic.
        let scores = [0.0, 0.9, 0.0, 0.9];
        let boxes = [0.1, 0.1, 0.2, 0.2];
        assert_eq!(decode(&scores, &boxes, 10, 10, 0.5).len(), 1);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([127, 255, 0]));
        let tensor = preprocess(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 240, 320]);
        assert!(tensor[[0, 0, 10, 10]].abs() < 1e-6);
        assert!((tensor[[0, 1, 10, 10]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 10, 10]] + 127.0 / 128.0).abs() < 1e-6);
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = ["461", "462"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1));
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceDetector::load(Path::new("/nonexistent/version-RFB-320.onnx"))
            .err()
            .unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
