//! The fixed set of pre-trained artifacts and where they live remotely.

use std::fmt;

/// Remote host every artifact is fetched from (ONNX model zoo, pinned commit).
pub const MODEL_BASE_URL: &str =
    "https://github.com/onnx/models/raw/5faef4c33eba0395177850e1e31c4a6a9e634c82/vision/body_analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelArtifact {
    /// UltraFace RFB-320, a compact single-shot face detector.
    FaceDetector,
    /// FER+ expression classifier.
    ExpressionClassifier,
}

impl ModelArtifact {
    pub const ALL: [ModelArtifact; 2] = [
        ModelArtifact::FaceDetector,
        ModelArtifact::ExpressionClassifier,
    ];

    /// Path below [`MODEL_BASE_URL`].
    pub fn remote_path(&self) -> &'static str {
        match self {
            ModelArtifact::FaceDetector => "ultraface/models/version-RFB-320.onnx",
            ModelArtifact::ExpressionClassifier => "emotion_ferplus/model/emotion-ferplus-8.onnx",
        }
    }

    /// File name inside the local model directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelArtifact::FaceDetector => "version-RFB-320.onnx",
            ModelArtifact::ExpressionClassifier => "emotion-ferplus-8.onnx",
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.remote_path())
    }
}

impl fmt::Display for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelArtifact::FaceDetector => f.write_str("face detector"),
            ModelArtifact::ExpressionClassifier => f.write_str("expression classifier"),
        }
    }
}
