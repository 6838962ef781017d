//! Generic object detector restricted to people.
//!
//! Runs an SSD-style COCO detector exported to ONNX (uint8 NHWC input,
//! normalized `[ymin, xmin, ymax, xmax]` boxes) and keeps only the person
//! class. It yields no landmarks, so it only backs detection-only sessions.

use crate::detector::{nms, DetectorError};
use crate::pipeline::{Detect, PipelineError};
use crate::preprocess::resize_bilinear;
use crate::types::{BoundingBox, RawDetection, RawRegion};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SSD_INPUT_SIZE: usize = 300;
/// COCO label id of "person" in TF object-detection exports.
const COCO_PERSON_CLASS: f32 = 1.0;
const PERSON_DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const PERSON_NMS_THRESHOLD: f32 = 0.5;

/// Output tensor positions: (boxes, classes, scores).
type OutputIndices = (usize, usize, usize);

pub struct PersonDetector {
    session: Session,
    score_threshold: f32,
    indices: OutputIndices,
}

impl PersonDetector {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 3 {
            return Err(DetectorError::InferenceFailed(format!(
                "object detector needs boxes/classes/scores outputs, got {names:?}"
            )));
        }
        let indices = discover_output_indices(&names);
        tracing::info!(path = model_path, outputs = ?names, ?indices, "loaded person detector");

        Ok(Self {
            session,
            score_threshold: PERSON_DEFAULT_SCORE_THRESHOLD,
            indices,
        })
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn detect(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, DetectorError> {
        let input = preprocess(frame, width as usize, height as usize);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (boxes_idx, classes_idx, scores_idx) = self.indices;
        let extract = |idx: usize, what: &str| {
            outputs[idx]
                .try_extract_tensor::<f32>()
                .map(|(_, data)| data)
                .map_err(|e| DetectorError::InferenceFailed(format!("{what}: {e}")))
        };

        let raw = person_detections(
            extract(boxes_idx, "boxes")?,
            extract(classes_idx, "classes")?,
            extract(scores_idx, "scores")?,
            self.score_threshold,
        );

        let boxes = raw
            .iter()
            .filter_map(|r| r.to_bounding_box(width, height))
            .collect();
        Ok(nms(boxes, PERSON_NMS_THRESHOLD))
    }
}

impl Detect for PersonDetector {
    fn detect(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, PipelineError> {
        Ok(PersonDetector::detect(self, frame, width, height)?)
    }
}

/// Stretch to the square input and replicate Y into RGB (uint8 NHWC).
fn preprocess(frame: &[u8], width: usize, height: usize) -> Array4<u8> {
    let resized = resize_bilinear(frame, width, height, SSD_INPUT_SIZE, SSD_INPUT_SIZE);
    Array4::from_shape_fn((1, SSD_INPUT_SIZE, SSD_INPUT_SIZE, 3), |(_, y, x, _)| {
        resized[y * SSD_INPUT_SIZE + x]
    })
}

/// Pair up boxes/classes/scores and keep confident person detections.
fn person_detections(boxes: &[f32], classes: &[f32], scores: &[f32], threshold: f32) -> Vec<RawDetection> {
    scores
        .iter()
        .zip(classes.iter())
        .zip(boxes.chunks_exact(4))
        .filter(|((&score, &class), _)| score >= threshold && class == COCO_PERSON_CLASS)
        .map(|((&score, _), b)| RawDetection {
            score,
            region: RawRegion::Corners {
                ymin: b[0],
                xmin: b[1],
                ymax: b[2],
                xmax: b[3],
            },
            normalized: true,
        })
        .collect()
}

/// Locate outputs by name ("detection_boxes", "detection_classes",
/// "detection_scores"), falling back to the TF export order.
fn discover_output_indices(names: &[String]) -> OutputIndices {
    let find = |needle: &str| names.iter().position(|n| n.contains(needle));
    match (find("boxes"), find("classes"), find("scores")) {
        (Some(b), Some(c), Some(s)) => (b, c, s),
        _ => (0, 1, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_person_filter() {
        let boxes = [
            0.1, 0.2, 0.5, 0.6, // person
            0.0, 0.0, 1.0, 1.0, // dog
            0.3, 0.3, 0.4, 0.4, // weak person
        ];
        let classes = [1.0, 18.0, 1.0];
        let scores = [0.9, 0.95, 0.2];

        let dets = person_detections(&boxes, &classes, &scores, 0.5);
        assert_eq!(dets.len(), 1);

        let bbox = dets[0].to_bounding_box(200, 100).unwrap();
        assert_abs_diff_eq!(bbox.x, 40.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bbox.y, 10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bbox.width, 80.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bbox.height, 40.0, epsilon = 1e-4);
    }

    #[test]
    fn test_preprocess_layout() {
        let frame = vec![42u8; 64 * 48];
        let input = preprocess(&frame, 64, 48);
        assert_eq!(input.shape(), &[1, SSD_INPUT_SIZE, SSD_INPUT_SIZE, 3]);
        assert!(input.iter().all(|&p| p == 42));
    }

    #[test]
    fn test_discover_named_outputs() {
        let names: Vec<String> = ["num_detections", "detection_scores", "detection_boxes", "detection_classes"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(discover_output_indices(&names), (2, 3, 1));
    }

    #[test]
    fn test_discover_positional_fallback() {
        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1, 2));
    }
}
