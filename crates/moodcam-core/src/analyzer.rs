//! Single-shot emotion analysis: detect one face, classify its expression.

use crate::classifier::{ClassifierError, ExpressionClassifier};
use crate::detector::{DetectorError, FaceDetector};
use crate::types::EmotionResult;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Face detector and expression classifier, run back to back.
pub struct EmotionAnalyzer {
    detector: FaceDetector,
    classifier: ExpressionClassifier,
}

impl EmotionAnalyzer {
    pub fn new(detector: FaceDetector, classifier: ExpressionClassifier) -> Self {
        Self {
            detector,
            classifier,
        }
    }

    /// Load both ONNX models.
    pub fn load(detector_path: &Path, classifier_path: &Path) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(detector_path)?;
        let classifier = ExpressionClassifier::load(classifier_path)?;
        Ok(Self::new(detector, classifier))
    }

    /// Analyze a still frame.
    ///
    /// A frame without a face, or whose face yields no expression data, maps
    /// to [`EmotionResult::NoFace`]. Only runtime failures are errors.
    pub fn analyze(&mut self, frame: &RgbImage) -> Result<EmotionResult, AnalyzerError> {
        let Some(face) = self.detector.detect_single(frame)? else {
            tracing::debug!(
                width = frame.width(),
                height = frame.height(),
                "no face in snapshot"
            );
            return Ok(EmotionResult::NoFace);
        };

        let scores = match self.classifier.classify(frame, &face) {
            Ok(scores) => scores,
            Err(ClassifierError::EmptyCrop) => {
                tracing::debug!(?face, "face crop empty, treating as no face");
                return Ok(EmotionResult::NoFace);
            }
            Err(e) => return Err(e.into()),
        };

        let result = EmotionResult::from_scores(&scores);
        tracing::info!(
            face_confidence = face.confidence,
            label = result.label(),
            confidence = result.confidence(),
            "expression classified"
        );
        Ok(result)
    }
}
