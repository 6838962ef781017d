//! Nearest-neighbor identity matching over labeled descriptors.

use crate::types::{Descriptor, LabeledDescriptor};
use thiserror::Error;

/// Default Euclidean distance threshold for a positive match.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, PartialEq)]
pub enum MatcherError {
    #[error("matcher needs at least one labeled descriptor")]
    Empty,
    #[error("descriptor {label} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
}

/// Result of matching a query descriptor against the labeled set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Label of the nearest descriptor, if it lies within the threshold.
    pub label: Option<String>,
    /// Distance to the nearest descriptor, reported even when unmatched.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }

    /// `1 - distance`, clamped to [0, 1].
    pub fn similarity(&self) -> f32 {
        (1.0 - self.distance).clamp(0.0, 1.0)
    }
}

/// Labeled descriptors plus a distance threshold. Built once, read-only after.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    labeled: Vec<LabeledDescriptor>,
    threshold: f32,
}

impl FaceMatcher {
    /// Build a matcher. Descriptors keep their load order, which decides ties.
    pub fn new(labeled: Vec<LabeledDescriptor>, threshold: f32) -> Result<Self, MatcherError> {
        let first = labeled.first().ok_or(MatcherError::Empty)?;
        let expected = first.descriptor.dim();
        if let Some(bad) = labeled.iter().find(|l| l.descriptor.dim() != expected) {
            return Err(MatcherError::DimensionMismatch {
                label: bad.label.clone(),
                expected,
                actual: bad.descriptor.dim(),
            });
        }
        Ok(Self { labeled, threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.labeled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labeled.is_empty()
    }

    /// Find the nearest labeled descriptor.
    ///
    /// Every entry is visited; the first entry reaching the minimum wins.
    /// A label is returned only when the minimum is strictly below the threshold.
    pub fn best_match(&self, query: &Descriptor) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_idx = 0usize;

        for (i, entry) in self.labeled.iter().enumerate() {
            let distance = query.euclidean_distance(&entry.descriptor);
            if distance < best_distance {
                best_distance = distance;
                best_idx = i;
            }
        }

        if best_distance < self.threshold {
            MatchResult {
                label: Some(self.labeled[best_idx].label.clone()),
                distance: best_distance,
            }
        } else {
            MatchResult {
                label: None,
                distance: best_distance,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labeled(label: &str, values: Vec<f32>) -> LabeledDescriptor {
        LabeledDescriptor {
            label: label.into(),
            descriptor: Descriptor::new(values),
        }
    }

    fn gallery() -> FaceMatcher {
        FaceMatcher::new(
            vec![
                labeled("ada", vec![1.0, 0.0, 0.0]),
                labeled("grace", vec![0.0, 1.0, 0.0]),
                labeled("linus", vec![0.0, 0.0, 1.0]),
            ],
            DEFAULT_DISTANCE_THRESHOLD,
        )
        .unwrap()
    }

    #[test]
    fn test_exact_descriptor_matches_with_zero_distance() {
        let matcher = gallery();
        let result = matcher.best_match(&Descriptor::new(vec![0.0, 1.0, 0.0]));
        assert_eq!(result.label.as_deref(), Some("grace"));
        assert_eq!(result.distance, 0.0);
        assert_relative_eq!(result.similarity(), 1.0);
    }

    #[test]
    fn test_far_descriptor_is_unknown() {
        let matcher = gallery();
        // Nearest stored entry is sqrt(0.5^2 + 0.5^2 + 0.5^2) ≈ 0.866 away.
        let result = matcher.best_match(&Descriptor::new(vec![0.5, 0.5, 0.5]));
        assert!(!result.is_match());
        assert!(result.distance > DEFAULT_DISTANCE_THRESHOLD);
        assert_relative_eq!(result.distance, 0.75f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_distance_at_threshold_is_unknown() {
        let matcher = FaceMatcher::new(vec![labeled("a", vec![0.0])], 0.5).unwrap();
        let result = matcher.best_match(&Descriptor::new(vec![0.5]));
        assert!(!result.is_match());
        assert_relative_eq!(result.distance, 0.5);
    }

    #[test]
    fn test_near_descriptor_matches() {
        let matcher = gallery();
        let result = matcher.best_match(&Descriptor::new(vec![0.9, 0.1, 0.0]));
        assert_eq!(result.label.as_deref(), Some("ada"));
        assert!(result.distance < 0.2);
    }

    #[test]
    fn test_tie_keeps_first_in_load_order() {
        let matcher = FaceMatcher::new(
            vec![
                labeled("first", vec![1.0, 0.0]),
                labeled("second", vec![-1.0, 0.0]),
            ],
            2.0,
        )
        .unwrap();
        let result = matcher.best_match(&Descriptor::new(vec![0.0, 0.0]));
        assert_eq!(result.label.as_deref(), Some("first"));
    }

    #[test]
    fn test_repeated_queries_are_deterministic() {
        let matcher = gallery();
        let query = Descriptor::new(vec![0.2, 0.7, 0.1]);
        let first = matcher.best_match(&query);
        for _ in 0..10 {
            assert_eq!(matcher.best_match(&query), first);
        }
    }

    #[test]
    fn test_empty_set_rejected() {
        assert_eq!(
            FaceMatcher::new(vec![], DEFAULT_DISTANCE_THRESHOLD).unwrap_err(),
            MatcherError::Empty
        );
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = FaceMatcher::new(
            vec![labeled("a", vec![1.0, 0.0]), labeled("b", vec![1.0])],
            DEFAULT_DISTANCE_THRESHOLD,
        )
        .unwrap_err();
        assert!(matches!(err, MatcherError::DimensionMismatch { actual: 1, .. }));
    }
}
