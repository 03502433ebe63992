//! moodcam-models — Pre-trained model artifacts.
//!
//! Knows the two ONNX files the app needs, the fixed host they are served
//! from, and how to cache them in a local model directory.

pub mod artifact;
pub mod store;

use std::path::PathBuf;

pub use artifact::{ModelArtifact, MODEL_BASE_URL};
pub use store::{FetchError, ModelPaths, ModelStore};

/// `$XDG_CACHE_HOME/moodcam/models`, falling back to `~/.cache/moodcam/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        })
        .join("moodcam")
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dir_suffix() {
        assert!(default_model_dir().ends_with("moodcam/models"));
    }
}
