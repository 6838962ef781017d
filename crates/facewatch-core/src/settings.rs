//! Confidence threshold applied to rendered, announced and recorded faces.

use serde::Serialize;
use thiserror::Error;

pub const MIN_CONFIDENCE: f32 = 0.10;
pub const MAX_CONFIDENCE: f32 = 0.90;
pub const CONFIDENCE_STEP: f32 = 0.05;

#[derive(Error, Debug, PartialEq)]
#[error("confidence threshold {0} outside 0.10..=0.90")]
pub struct ThresholdError(pub f32);

/// A threshold in [0.10, 0.90] on the 0.05 grid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ConfidenceThreshold(f32);

impl ConfidenceThreshold {
    /// Validate and snap to the nearest step.
    pub fn new(value: f32) -> Result<Self, ThresholdError> {
        // Slider arithmetic can land a hair outside the range.
        const EPS: f32 = 1e-4;
        if !value.is_finite() || value < MIN_CONFIDENCE - EPS || value > MAX_CONFIDENCE + EPS {
            return Err(ThresholdError(value));
        }
        let steps = (value / CONFIDENCE_STEP).round();
        Ok(Self((steps * CONFIDENCE_STEP).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        Self(0.50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.10, 0.10)]
    #[case(0.12, 0.10)]
    #[case(0.13, 0.15)]
    #[case(0.5, 0.5)]
    #[case(0.674, 0.65)]
    #[case(0.90, 0.90)]
    fn test_snaps_to_step(#[case] input: f32, #[case] expected: f32) {
        assert_abs_diff_eq!(ConfidenceThreshold::new(input).unwrap().value(), expected, epsilon = 1e-5);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.05)]
    #[case(0.95)]
    #[case(1.0)]
    #[case(f32::NAN)]
    fn test_rejects_out_of_range(#[case] input: f32) {
        assert!(ConfidenceThreshold::new(input).is_err());
    }

    #[test]
    fn test_default() {
        assert_abs_diff_eq!(ConfidenceThreshold::default().value(), 0.5);
    }
}
