//! Frame analysis: detection, optional descriptor extraction and matching.

use crate::detector::DetectorError;
use crate::identities::IdentityStore;
use crate::matcher::FaceMatcher;
use crate::recognizer::RecognizerError;
use crate::types::{BoundingBox, Category, Descriptor, LabeledDescriptor, RecognizedFace, UNKNOWN_ID};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A source of face (or person) boxes for a grayscale frame.
pub trait Detect: Send {
    fn detect(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, PipelineError>;
}

/// Extracts an identity descriptor for one detected face.
pub trait Describe: Send {
    fn describe(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Descriptor, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Face,
    Person,
}

impl DetectorKind {
    /// Name shown for detections that carry no identity.
    pub fn unlabeled_name(&self) -> &'static str {
        match self {
            DetectorKind::Face => "Face Detected",
            DetectorKind::Person => "Person",
        }
    }
}

/// Name shown for faces the matcher could not place.
pub const UNKNOWN_NAME: &str = "Unknown";

/// The capability in use for this session.
pub enum Pipeline {
    /// Boxes only; every face is unlabeled.
    Detection {
        kind: DetectorKind,
        detector: Box<dyn Detect>,
    },
    /// Boxes, descriptors, and nearest-neighbor identity.
    Recognition {
        detector: Box<dyn Detect>,
        recognizer: Box<dyn Describe>,
        matcher: FaceMatcher,
        identities: IdentityStore,
    },
}

/// Serializable summary of the active pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub mode: &'static str,
    pub detector: DetectorKind,
    pub identities: usize,
    pub match_threshold: Option<f32>,
}

impl Pipeline {
    /// Build a recognition pipeline when at least one descriptor loaded,
    /// otherwise fall back to face detection only.
    pub fn from_descriptors(
        detector: Box<dyn Detect>,
        recognizer: Box<dyn Describe>,
        descriptors: Vec<LabeledDescriptor>,
        identities: IdentityStore,
        match_threshold: f32,
    ) -> Self {
        match FaceMatcher::new(descriptors, match_threshold) {
            Ok(matcher) => {
                tracing::info!(identities = matcher.len(), threshold = match_threshold, "recognition enabled");
                Pipeline::Recognition { detector, recognizer, matcher, identities }
            }
            Err(e) => {
                tracing::warn!(error = %e, "no usable reference descriptors; running detection only");
                Pipeline::Detection { kind: DetectorKind::Face, detector }
            }
        }
    }

    pub fn summary(&self) -> PipelineSummary {
        match self {
            Pipeline::Detection { kind, .. } => PipelineSummary {
                mode: "detection",
                detector: *kind,
                identities: 0,
                match_threshold: None,
            },
            Pipeline::Recognition { matcher, .. } => PipelineSummary {
                mode: "recognition",
                detector: DetectorKind::Face,
                identities: matcher.len(),
                match_threshold: Some(matcher.threshold()),
            },
        }
    }

    /// Detect faces in a grayscale frame and attach identities where possible.
    pub fn analyze(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<RecognizedFace>, PipelineError> {
        match self {
            Pipeline::Detection { kind, detector } => {
                let boxes = detector.detect(frame, width, height)?;
                Ok(boxes.into_iter().map(|b| unlabeled(b, kind.unlabeled_name())).collect())
            }
            Pipeline::Recognition { detector, recognizer, matcher, identities } => {
                let boxes = detector.detect(frame, width, height)?;
                let mut faces = Vec::with_capacity(boxes.len());

                for bbox in boxes {
                    let descriptor = match recognizer.describe(frame, width, height, &bbox) {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::debug!(error = %e, "descriptor extraction failed; face left unidentified");
                            faces.push(unlabeled(bbox, UNKNOWN_NAME));
                            continue;
                        }
                    };

                    let result = matcher.best_match(&descriptor);
                    let identity = result.label.as_deref().and_then(|id| identities.get(id));
                    // Unplaced faces keep their distance but score by detector
                    // confidence; a similarity below 0.4 would hide them at any threshold.
                    let (id, name, category, similarity) = match identity {
                        Some(identity) => (
                            identity.id.clone(),
                            identity.name.clone(),
                            identity.category,
                            Some(result.similarity()),
                        ),
                        None => (UNKNOWN_ID.to_string(), UNKNOWN_NAME.to_string(), Category::Unknown, None),
                    };

                    faces.push(RecognizedFace {
                        id,
                        name,
                        category,
                        confidence: bbox.confidence,
                        similarity,
                        distance: Some(result.distance),
                        bounding_box: bbox,
                    });
                }

                Ok(faces)
            }
        }
    }
}

fn unlabeled(bbox: BoundingBox, name: &str) -> RecognizedFace {
    RecognizedFace {
        id: UNKNOWN_ID.to_string(),
        name: name.to_string(),
        category: Category::Unknown,
        confidence: bbox.confidence,
        similarity: None,
        distance: None,
        bounding_box: bbox,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted detectors and describers for tests without ONNX models.

    use super::*;
    use std::collections::VecDeque;

    pub fn bbox(x: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x,
            y: 10.0,
            width: 40.0,
            height: 40.0,
            confidence,
            landmarks: Some([(0.0, 0.0); 5]),
        }
    }

    /// Returns the same boxes for every frame.
    pub struct FixedDetector(pub Vec<BoundingBox>);

    impl Detect for FixedDetector {
        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<BoundingBox>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    /// Returns descriptors from a queue, one per call.
    pub struct QueuedDescriber(pub VecDeque<Result<Descriptor, PipelineError>>);

    impl Describe for QueuedDescriber {
        fn describe(&mut self, _: &[u8], _: u32, _: u32, _: &BoundingBox) -> Result<Descriptor, PipelineError> {
            self.0
                .pop_front()
                .unwrap_or(Err(PipelineError::Recognizer(RecognizerError::NoLandmarks)))
        }
    }
}
