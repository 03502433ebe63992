//! moodcam-core — Face detection and expression classification engine.
//!
//! Uses UltraFace for face detection and FER+ for expression
//! classification, both running via ONNX Runtime for CPU inference.

pub mod analyzer;
pub mod classifier;
pub mod detector;
pub mod types;

pub use analyzer::{AnalyzerError, EmotionAnalyzer};
pub use classifier::{ClassifierError, ExpressionClassifier};
pub use detector::{DetectorError, FaceDetector};
pub use types::{BoundingBox, EmotionResult, Expression, ExpressionScores, NO_FACE_LABEL};
