use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory the ONNX model files are cached in.
    pub model_dir: PathBuf,
    /// Remote host the model files are downloaded from.
    pub model_base_url: String,
    /// Per-request timeout for model downloads, in seconds.
    pub download_timeout_secs: u64,
    /// How long to wait for one capture-and-classify round trip, in seconds.
    pub capture_timeout_secs: u64,
    /// Number of warmup frames to discard after opening the camera.
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `MOODCAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            camera_device: lookup("MOODCAM_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: lookup("MOODCAM_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(moodcam_models::default_model_dir),
            model_base_url: lookup("MOODCAM_MODEL_BASE_URL")
                .unwrap_or_else(|| moodcam_models::MODEL_BASE_URL.to_string()),
            download_timeout_secs: parse_or(lookup("MOODCAM_DOWNLOAD_TIMEOUT_SECS"), 120),
            capture_timeout_secs: parse_or(lookup("MOODCAM_CAPTURE_TIMEOUT_SECS"), 10),
            warmup_frames: parse_or(lookup("MOODCAM_WARMUP_FRAMES"), 4),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
