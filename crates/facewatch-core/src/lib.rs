//! facewatch-core — face detection, recognition and presentation logic.
//!
//! Detection uses SCRFD (or an SSD person detector), recognition uses ArcFace,
//! both through ONNX Runtime. Matching, overlay rendering, alert throttling and
//! history are plain Rust with no model dependency.

pub mod alerts;
pub mod alignment;
pub mod detector;
pub mod history;
pub mod identities;
pub mod loader;
pub mod matcher;
pub mod overlay;
pub mod person;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod settings;
pub mod types;

pub use alerts::{AlertDispatcher, Announcement, Speaker};
pub use detector::FaceDetector;
pub use history::{DetectionHistory, HistoryEntry};
pub use identities::{IdentityStore, PortraitSource, ReferenceIdentity};
pub use matcher::{FaceMatcher, MatchResult};
pub use person::PersonDetector;
pub use pipeline::{DetectorKind, Pipeline, PipelineError, PipelineSummary};
pub use recognizer::FaceRecognizer;
pub use settings::ConfidenceThreshold;
pub use types::{BoundingBox, Category, Descriptor, LabeledDescriptor, RecognizedFace};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/facewatch/models`
/// (or `~/.local/share/facewatch/models`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch/models")
}
