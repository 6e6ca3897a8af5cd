use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of points produced by the landmark model.
pub const LANDMARK_POINTS: usize = 68;

/// Borrowed grayscale frame: `width * height` bytes, row-major.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> FrameView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        Self { data, width, height }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// True when the buffer holds at least one byte per pixel.
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= self.width as usize * self.height as usize
    }
}

/// Width/height pair for frames, display surfaces and overlays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Which detector model a detection pass should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Small SCRFD variant, fast but less accurate.
    Tiny,
    /// Large SCRFD variant used for descriptor-quality detections.
    Accurate,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Tiny => f.write_str("tiny"),
            DetectorKind::Accurate => f.write_str("accurate"),
        }
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiny" => Ok(DetectorKind::Tiny),
            "accurate" => Ok(DetectorKind::Accurate),
            other => Err(format!("unknown detector '{other}' (expected tiny or accurate)")),
        }
    }
}

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

impl BoundingBox {
    /// Scale geometry by independent x/y factors. Confidence is unchanged.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|pts| pts.map(|(x, y)| (x * sx, y * sy))),
        }
    }
}

/// 68-point facial landmarks (iBUG 300-W ordering) in frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks68 {
    points: Vec<(f32, f32)>,
}

impl FaceLandmarks68 {
    /// Wrap exactly [`LANDMARK_POINTS`] points; any other count is rejected.
    pub fn new(points: Vec<(f32, f32)>) -> Option<Self> {
        (points.len() == LANDMARK_POINTS).then_some(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Reduce to the five alignment points used by the recognition encoder.
    ///
    /// Eye points are the centroid of each eye contour; the image-left eye is
    /// the subject's right eye (points 36–41).
    pub fn to_five_point(&self) -> [(f32, f32); 5] {
        let centroid = |range: std::ops::Range<usize>| {
            let n = range.len() as f32;
            let (sx, sy) = self.points[range]
                .iter()
                .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        [
            centroid(36..42),
            centroid(42..48),
            self.points[30],
            self.points[48],
            self.points[54],
        ]
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self.points.iter().map(|&(x, y)| (x * sx, y * sy)).collect(),
        }
    }
}

/// Face descriptor vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    /// Euclidean distance between two descriptors.
    pub fn distance(&self, other: &FaceDescriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame: box, landmarks and descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub detection: BoundingBox,
    pub landmarks: FaceLandmarks68,
    pub descriptor: FaceDescriptor,
}

impl FaceDetection {
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            detection: self.detection.scaled(sx, sy),
            landmarks: self.landmarks.scaled(sx, sy),
            descriptor: self.descriptor.clone(),
        }
    }
}

/// Rescale detection geometry from the frame it was computed on to a display size.
///
/// A zero-sized source leaves the detections untouched.
pub fn resize_results(
    detections: Vec<FaceDetection>,
    from: Dimensions,
    to: Dimensions,
) -> Vec<FaceDetection> {
    if from.width == 0 || from.height == 0 || from == to {
        return detections;
    }
    let sx = to.width as f32 / from.width as f32;
    let sy = to.height as f32 / from.height as f32;
    detections.iter().map(|d| d.scaled(sx, sy)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_landmarks() -> FaceLandmarks68 {
        FaceLandmarks68::new((0..68).map(|i| (i as f32, (i * 2) as f32)).collect()).unwrap()
    }

    fn detection(x: f32, y: f32) -> FaceDetection {
        FaceDetection {
            detection: BoundingBox {
                x, y, width: 40.0, height: 60.0, confidence: 0.9,
                landmarks: Some([(1.0, 1.0); 5]),
            },
            landmarks: grid_landmarks(),
            descriptor: FaceDescriptor::new(vec![0.5, 0.5]),
        }
    }

    #[test]
    fn test_descriptor_distance() {
        let a = FaceDescriptor::new(vec![0.0, 0.0]);
        let b = FaceDescriptor::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_landmarks_require_68_points() {
        assert!(FaceLandmarks68::new(vec![(0.0, 0.0); 5]).is_none());
        assert!(FaceLandmarks68::new(vec![(0.0, 0.0); 68]).is_some());
    }

    #[test]
    fn test_five_point_reduction() {
        let five = grid_landmarks().to_five_point();
        // Mean of 36..42 is 38.5
        assert!((five[0].0 - 38.5).abs() < 1e-6);
        assert!((five[0].1 - 77.0).abs() < 1e-6);
        assert!((five[1].0 - 44.5).abs() < 1e-6);
        assert_eq!(five[2], (30.0, 60.0));
        assert_eq!(five[3], (48.0, 96.0));
        assert_eq!(five[4], (54.0, 108.0));
    }

    #[test]
    fn test_resize_results_scales_geometry() {
        let resized = resize_results(
            vec![detection(10.0, 20.0)],
            Dimensions::new(320, 240),
            Dimensions::new(640, 480),
        );
        let b = &resized[0].detection;
        assert_eq!((b.x, b.y, b.width, b.height), (20.0, 40.0, 80.0, 120.0));
        assert_eq!(b.landmarks.unwrap()[0], (2.0, 2.0));
        assert_eq!(resized[0].landmarks.points()[1], (2.0, 4.0));
        assert_eq!(resized[0].descriptor.values, vec![0.5, 0.5]);
    }

    #[test]
    fn test_resize_results_zero_source_is_noop() {
        let resized = resize_results(
            vec![detection(10.0, 20.0)],
            Dimensions::new(0, 0),
            Dimensions::new(640, 480),
        );
        assert_eq!(resized[0].detection.x, 10.0);
    }

    #[test]
    fn test_detector_kind_parse() {
        assert_eq!("Tiny".parse::<DetectorKind>(), Ok(DetectorKind::Tiny));
        assert_eq!(" accurate ".parse::<DetectorKind>(), Ok(DetectorKind::Accurate));
        assert!("ssd".parse::<DetectorKind>().is_err());
    }

    #[test]
    fn test_frame_view_completeness() {
        let data = vec![0u8; 12];
        assert!(FrameView::new(&data, 4, 3).is_complete());
        assert!(!FrameView::new(&data, 4, 4).is_complete());
        assert!(!FrameView::new(&data, 0, 3).is_complete());
    }
}
