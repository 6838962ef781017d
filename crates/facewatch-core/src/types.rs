use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Region reported by a detector before it is mapped into frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawRegion {
    Corners {
        xmin: f32,
        ymin: f32,
        xmax: f32,
        ymax: f32,
    },
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

/// Detector-native result. Coordinates may be normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub score: f32,
    pub region: RawRegion,
    pub normalized: bool,
}

impl RawDetection {
    /// Map into frame pixels, clamping to the frame. Returns `None` for
    /// boxes with no area left after clamping.
    pub fn to_bounding_box(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let (sx, sy) = if self.normalized {
            (frame_width as f32, frame_height as f32)
        } else {
            (1.0, 1.0)
        };

        let (x1, y1, x2, y2) = match self.region {
            RawRegion::Corners { xmin, ymin, xmax, ymax } => (xmin, ymin, xmax, ymax),
            RawRegion::Rect { x, y, width, height } => (x, y, x + width, y + height),
        };

        let x1 = (x1 * sx).clamp(0.0, frame_width as f32);
        let y1 = (y1 * sy).clamp(0.0, frame_height as f32);
        let x2 = (x2 * sx).clamp(0.0, frame_width as f32);
        let y2 = (y2 * sy).clamp(0.0, frame_height as f32);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: self.score,
            landmarks: None,
        })
    }
}

/// Face descriptor vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    /// Euclidean distance between two descriptors.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// A descriptor tagged with the id of the reference identity it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledDescriptor {
    pub label: String,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    User,
    Celebrity,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::User => "user",
            Category::Celebrity => "celebrity",
            Category::Unknown => "unknown",
        }
    }
}

/// Id used for faces that matched no reference identity.
pub const UNKNOWN_ID: &str = "unknown";

/// One detection-cycle result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFace {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub bounding_box: BoundingBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    /// `1 - distance`, clamped to [0, 1], when the matcher placed the face.
    pub similarity: Option<f32>,
    /// Distance to the nearest labeled descriptor, when a matcher was consulted.
    pub distance: Option<f32>,
}

impl RecognizedFace {
    /// Score used for confidence filtering and the overlay percentage.
    pub fn score(&self) -> f32 {
        self.similarity.unwrap_or(self.confidence)
    }

    pub fn is_known(&self) -> bool {
        self.category != Category::Unknown
    }
}

/// Keep only faces whose score reaches `threshold`.
pub fn filter_by_score(faces: &[RecognizedFace], threshold: f32) -> Vec<RecognizedFace> {
    faces
        .iter()
        .filter(|f| f.score() >= threshold)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn face(score: f32) -> RecognizedFace {
        RecognizedFace {
            id: UNKNOWN_ID.into(),
            name: "Face Detected".into(),
            category: Category::Unknown,
            bounding_box: BoundingBox {
                x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: score, landmarks: None,
            },
            confidence: score,
            similarity: None,
            distance: None,
        }
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert_relative_eq!(a.euclidean_distance(&b), 5.0);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_raw_corners_normalized() {
        let raw = RawDetection {
            score: 0.8,
            region: RawRegion::Corners { xmin: 0.25, ymin: 0.5, xmax: 0.75, ymax: 1.0 },
            normalized: true,
        };
        let bbox = raw.to_bounding_box(640, 480).unwrap();
        assert_relative_eq!(bbox.x, 160.0);
        assert_relative_eq!(bbox.y, 240.0);
        assert_relative_eq!(bbox.width, 320.0);
        assert_relative_eq!(bbox.height, 240.0);
        assert_relative_eq!(bbox.confidence, 0.8);
    }

    #[test]
    fn test_raw_rect_pixels_clamped() {
        let raw = RawDetection {
            score: 0.9,
            region: RawRegion::Rect { x: -10.0, y: 20.0, width: 50.0, height: 500.0 },
            normalized: false,
        };
        let bbox = raw.to_bounding_box(100, 100).unwrap();
        assert_relative_eq!(bbox.x, 0.0);
        assert_relative_eq!(bbox.width, 40.0);
        assert_relative_eq!(bbox.y, 20.0);
        assert_relative_eq!(bbox.height, 80.0);
    }

    #[test]
    fn test_raw_outside_frame_is_dropped() {
        let raw = RawDetection {
            score: 0.9,
            region: RawRegion::Corners { xmin: 1.2, ymin: 0.1, xmax: 1.5, ymax: 0.4 },
            normalized: true,
        };
        assert!(raw.to_bounding_box(640, 480).is_none());
    }

    #[test]
    fn test_score_prefers_similarity() {
        let mut f = face(0.95);
        assert_relative_eq!(f.score(), 0.95);
        f.similarity = Some(0.6);
        assert_relative_eq!(f.score(), 0.6);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.1)]
    #[case(0.35)]
    #[case(0.5)]
    #[case(0.9)]
    #[case(1.0)]
    fn test_filter_by_score_monotonic(#[case] threshold: f32) {
        let faces: Vec<_> = [0.05, 0.2, 0.35, 0.5, 0.7, 0.99].iter().map(|&s| face(s)).collect();
        let kept = filter_by_score(&faces, threshold);
        assert!(kept.iter().all(|f| f.score() >= threshold));
        let expected = faces.iter().filter(|f| f.score() >= threshold).count();
        assert_eq!(kept.len(), expected);

        // Raising the threshold never adds faces back.
        let stricter = filter_by_score(&faces, (threshold + 0.1).min(1.0));
        assert!(stricter.len() <= kept.len());
    }
}
