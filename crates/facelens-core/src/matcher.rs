//! Labeled descriptor sets and nearest-label matching.

use crate::types::FaceDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Label reported when no enrolled identity is within the threshold.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Default Euclidean distance threshold for a positive match.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, PartialEq)]
pub enum MatcherError {
    #[error("matcher needs at least one labeled descriptor set")]
    NoLabels,
    #[error("distance threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f32),
}

/// An identity label and the descriptors enrolled for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledDescriptors {
    pub label: String,
    pub descriptors: Vec<FaceDescriptor>,
}

impl LabeledDescriptors {
    pub fn new(label: impl Into<String>, descriptors: Vec<FaceDescriptor>) -> Self {
        Self {
            label: label.into(),
            descriptors,
        }
    }

    /// Mean distance from `probe` to every enrolled descriptor.
    ///
    /// `None` when nothing is enrolled: an empty set can never match.
    pub fn mean_distance(&self, probe: &FaceDescriptor) -> Option<f32> {
        if self.descriptors.is_empty() {
            return None;
        }
        let total: f32 = self.descriptors.iter().map(|d| d.distance(probe)).sum();
        Some(total / self.descriptors.len() as f32)
    }
}

/// Verdict for one probe descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub label: String,
    pub distance: f32,
}

impl FaceMatch {
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Renders as `label (0.42)`: the distance floored to two decimals and
/// printed without trailing zeros, so 0.5 shows as `(0.5)`. A match with no
/// finite distance renders as the bare label.
impl fmt::Display for FaceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.distance.is_finite() {
            return f.write_str(&self.label);
        }
        let floored = (self.distance * 100.0).floor() / 100.0;
        write!(f, "{} ({floored})", self.label)
    }
}

/// Immutable matcher over the enrolled reference sets.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    labeled: Vec<LabeledDescriptors>,
    distance_threshold: f32,
}

impl FaceMatcher {
    pub fn new(
        labeled: Vec<LabeledDescriptors>,
        distance_threshold: f32,
    ) -> Result<Self, MatcherError> {
        if labeled.is_empty() {
            return Err(MatcherError::NoLabels);
        }
        if !distance_threshold.is_finite() || distance_threshold <= 0.0 {
            return Err(MatcherError::InvalidThreshold(distance_threshold));
        }
        Ok(Self {
            labeled,
            distance_threshold,
        })
    }

    pub fn labeled_descriptors(&self) -> &[LabeledDescriptors] {
        &self.labeled
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labeled.iter().map(|l| l.label.as_str())
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    /// Find the enrolled label closest to `probe`.
    ///
    /// The closest label wins only when its mean distance is strictly below
    /// the threshold; otherwise the result is [`UNKNOWN_LABEL`] carrying the
    /// closest distance seen (infinite when no label has descriptors).
    pub fn find_best_match(&self, probe: &FaceDescriptor) -> FaceMatch {
        let best = self
            .labeled
            .iter()
            .filter_map(|l| l.mean_distance(probe).map(|d| (l, d)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((labeled, distance)) if distance < self.distance_threshold => FaceMatch {
                label: labeled.label.clone(),
                distance,
            },
            Some((_, distance)) => FaceMatch {
                label: UNKNOWN_LABEL.to_string(),
                distance,
            },
            None => FaceMatch {
                label: UNKNOWN_LABEL.to_string(),
                distance: f32::INFINITY,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(values: &[f32]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec())
    }

    fn matcher(sets: Vec<LabeledDescriptors>) -> FaceMatcher {
        FaceMatcher::new(sets, DEFAULT_DISTANCE_THRESHOLD).unwrap()
    }

    #[test]
    fn test_match_just_below_threshold() {
        let m = matcher(vec![LabeledDescriptors::new("Luke", vec![desc(&[0.0, 0.0])])]);
        let result = m.find_best_match(&desc(&[0.59, 0.0]));
        assert_eq!(result.label, "Luke");
        assert!((result.distance - 0.59).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_just_above_threshold() {
        let m = matcher(vec![LabeledDescriptors::new("Luke", vec![desc(&[0.0, 0.0])])]);
        let result = m.find_best_match(&desc(&[0.61, 0.0]));
        assert!(result.is_unknown());
        assert!((result.distance - 0.61).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let m = FaceMatcher::new(
            vec![LabeledDescriptors::new("Luke", vec![desc(&[0.0])])],
            0.5,
        )
        .unwrap();
        assert!(m.find_best_match(&desc(&[0.5])).is_unknown());
    }

    #[test]
    fn test_closest_label_wins_by_mean_distance() {
        let m = matcher(vec![
            LabeledDescriptors::new("Luke", vec![desc(&[0.0]), desc(&[0.5])]),
            LabeledDescriptors::new("Nico", vec![desc(&[0.3])]),
        ]);
        // Luke mean = (0.2 + 0.3) / 2 = 0.25, Nico = 0.1
        let result = m.find_best_match(&desc(&[0.2]));
        assert_eq!(result.label, "Nico");
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_empty_label_present_but_never_matches() {
        let m = matcher(vec![
            LabeledDescriptors::new("Luke", vec![]),
            LabeledDescriptors::new("Nico", vec![desc(&[5.0])]),
        ]);
        assert_eq!(m.labels().collect::<Vec<_>>(), vec!["Luke", "Nico"]);
        let result = m.find_best_match(&desc(&[0.0]));
        assert!(result.is_unknown());
        assert!((result.distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_labels_empty_reports_infinite_distance() {
        let m = matcher(vec![LabeledDescriptors::new("Luke", vec![])]);
        let result = m.find_best_match(&desc(&[0.0]));
        assert!(result.is_unknown());
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_new_rejects_empty_and_bad_threshold() {
        assert_eq!(
            FaceMatcher::new(vec![], 0.6).unwrap_err(),
            MatcherError::NoLabels
        );
        let sets = vec![LabeledDescriptors::new("Luke", vec![])];
        assert!(matches!(
            FaceMatcher::new(sets, f32::NAN),
            Err(MatcherError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_display_truncates_distance() {
        let m = FaceMatch { label: "Luke".into(), distance: 0.4279 };
        assert_eq!(m.to_string(), "Luke (0.42)");
        let u = FaceMatch { label: UNKNOWN_LABEL.into(), distance: 0.75 };
        assert_eq!(u.to_string(), "unknown (0.75)");
        let half = FaceMatch { label: "Luke".into(), distance: 0.5 };
        assert_eq!(half.to_string(), "Luke (0.5)");
        let zero = FaceMatch { label: "Luke".into(), distance: 0.0 };
        assert_eq!(zero.to_string(), "Luke (0)");
    }

    #[test]
    fn test_display_without_candidates_is_bare_label() {
        let m = matcher(vec![LabeledDescriptors::new("Luke", vec![])]);
        let result = m.find_best_match(&desc(&[0.0]));
        assert_eq!(result.to_string(), "unknown");
    }

    #[test]
    fn test_face_match_serializes() {
        let m = FaceMatch { label: "Nico".into(), distance: 0.25 };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["label"], "Nico");
        assert_eq!(json["distance"], 0.25);
    }
}
