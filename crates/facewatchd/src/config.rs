use facewatch_core::pipeline::DetectorKind;
use std::path::PathBuf;
use std::time::Duration;

const MIN_INTERVAL_MS: u64 = 200;
const MAX_INTERVAL_MS: u64 = 500;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Which detector backs the session.
    pub detector: DetectorKind,
    /// Reference identity TOML file.
    pub identities_path: PathBuf,
    /// Euclidean descriptor distance below which a face matches.
    pub match_threshold: f32,
    /// Pause between the end of one detection attempt and the next.
    pub detection_interval: Duration,
    /// Initial confidence threshold for rendered faces.
    pub confidence: f32,
    /// Per-identity gap between spoken alerts.
    pub alert_cooldown: Duration,
    pub muted: bool,
    /// Program invoked with one phrase argument per alert.
    pub speech_command: String,
    /// TrueType font for overlay labels.
    pub font_path: Option<PathBuf>,
    /// PNG rewritten with the overlay after each cycle.
    pub overlay_path: Option<PathBuf>,
    /// Identity that gets the overlay marker and its own phrase.
    pub distinguished_id: Option<String>,
    /// Frames discarded after opening the camera (AGC/AE settling).
    pub warmup_frames: usize,
    /// Apply CLAHE to detector input.
    pub enhance_contrast: bool,
    /// Timeout for fetching one reference portrait.
    pub fetch_timeout: Duration,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEWATCH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facewatch_core::default_model_dir());

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("facewatch");

        let detector = match env_string("FACEWATCH_DETECTOR").as_deref() {
            Some("person") => DetectorKind::Person,
            Some("face") | None => DetectorKind::Face,
            Some(other) => {
                tracing::warn!(value = other, "unknown FACEWATCH_DETECTOR; using face");
                DetectorKind::Face
            }
        };

        Self {
            camera_device: env_string("FACEWATCH_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            detector,
            identities_path: env_string("FACEWATCH_IDENTITIES")
                .map(PathBuf::from)
                .unwrap_or_else(|| config_dir.join("identities.toml")),
            match_threshold: env_parse("FACEWATCH_MATCH_THRESHOLD", 0.6),
            detection_interval: clamp_interval(env_parse("FACEWATCH_INTERVAL_MS", 300)),
            confidence: env_parse("FACEWATCH_CONFIDENCE", 0.5),
            alert_cooldown: Duration::from_millis(env_parse("FACEWATCH_ALERT_COOLDOWN_MS", 5000)),
            muted: env_flag("FACEWATCH_MUTED", false),
            speech_command: env_string("FACEWATCH_SPEECH_COMMAND").unwrap_or_else(|| "spd-say".to_string()),
            font_path: env_string("FACEWATCH_FONT").map(PathBuf::from),
            overlay_path: env_string("FACEWATCH_OVERLAY_PATH").map(PathBuf::from),
            distinguished_id: env_string("FACEWATCH_DISTINGUISHED_ID"),
            warmup_frames: env_parse("FACEWATCH_WARMUP_FRAMES", 4),
            enhance_contrast: env_flag("FACEWATCH_ENHANCE_CONTRAST", true),
            fetch_timeout: Duration::from_secs(env_parse("FACEWATCH_FETCH_TIMEOUT_SECS", 10)),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_path("w600k_r50.onnx")
    }

    /// Path to the SSD person detection model.
    pub fn person_model_path(&self) -> String {
        self.model_path("ssd_mobilenet_v1.onnx")
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }
}

fn clamp_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(50, 200)]
    #[case(200, 200)]
    #[case(300, 300)]
    #[case(500, 500)]
    #[case(2000, 500)]
    fn test_interval_is_clamped(#[case] requested: u64, #[case] expected: u64) {
        assert_eq!(clamp_interval(requested), Duration::from_millis(expected));
    }

    #[test]
    fn test_model_paths() {
        let mut config = Config::from_env();
        config.model_dir = PathBuf::from("/models");
        assert_eq!(config.scrfd_model_path(), "/models/det_10g.onnx");
        assert_eq!(config.arcface_model_path(), "/models/w600k_r50.onnx");
        assert_eq!(config.person_model_path(), "/models/ssd_mobilenet_v1.onnx");
    }
}
