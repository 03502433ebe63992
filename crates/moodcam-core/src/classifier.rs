//! FER+ facial expression classifier via ONNX Runtime.
//!
//! Crops a detected face out of the frame, converts it to a 64x64 luma
//! patch, and turns the model's eight logits into probabilities.

use crate::types::{BoundingBox, Expression, ExpressionScores};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FERPLUS_INPUT_SIZE: u32 = 64;
/// Extra context around the detector box, as a fraction of its longer side.
const FACE_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box lies outside the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+-based expression classifier.
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Classify the expression of `face` within `frame`.
    pub fn classify(
        &mut self,
        frame: &RgbImage,
        face: &BoundingBox,
    ) -> Result<ExpressionScores, ClassifierError> {
        let crop = face_crop(frame, face).ok_or(ClassifierError::EmptyCrop)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("expression logits: {e}")))?;

        let weights: [f32; Expression::COUNT] =
            softmax(logits).try_into().map_err(|v: Vec<f32>| {
                ClassifierError::InferenceFailed(format!(
                    "expected {} expression logits, got {}",
                    Expression::COUNT,
                    v.len()
                ))
            })?;

        Ok(ExpressionScores::from_weights(weights))
    }
}

/// Square luma crop around the face, padded by [`FACE_MARGIN`] and clamped
/// to the frame. `None` if nothing of the box remains inside the frame.
fn face_crop(frame: &RgbImage, face: &BoundingBox) -> Option<GrayImage> {
    let side = face.width.max(face.height) * (1.0 + 2.0 * FACE_MARGIN);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0).round() as u32;
    let y0 = (cy - side / 2.0).max(0.0).round() as u32;
    let x1 = ((cx + side / 2.0).max(0.0).round() as u32).min(frame.width());
    let y1 = ((cy + side / 2.0).max(0.0).round() as u32).min(frame.height());

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let region = imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(imageops::grayscale(&region))
}

/// Resize a luma crop to 64x64 and lay it out as `[1, 1, 64, 64]` raw values.
fn preprocess(face: &GrayImage) -> Array4<f32> {
    let size = FERPLUS_INPUT_SIZE;
    let resized = imageops::resize(face, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 1, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }

    tensor
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|e| e / sum).collect()
    } else {
        exps
    }
}
