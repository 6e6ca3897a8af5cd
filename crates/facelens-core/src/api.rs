//! The face pipeline seam: detect → landmarks → descriptor.

use crate::detector::{DetectorError, FaceDetector};
use crate::landmarks::{LandmarkError, LandmarkNet};
use crate::models::{LoadedModel, ModelKind};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DetectorKind, FaceDetection, FrameView};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceApiError {
    #[error("frame buffer too short for {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("model {0} is missing or of the wrong type")]
    MissingModel(ModelKind),
    #[error("{0}")]
    Other(String),
}

/// Full face pipeline over a grayscale frame.
///
/// Implementations own blocking inference state, hence `&mut self`.
pub trait FaceApi: Send {
    /// Detect every face and describe each one.
    fn detect_all(
        &mut self,
        frame: FrameView<'_>,
        detector: DetectorKind,
    ) -> Result<Vec<FaceDetection>, FaceApiError>;

    /// Detect and describe the most confident face only.
    fn detect_single(
        &mut self,
        frame: FrameView<'_>,
        detector: DetectorKind,
    ) -> Result<Option<FaceDetection>, FaceApiError> {
        let best = self.detect_all(frame, detector)?.into_iter().max_by(|a, b| {
            a.detection
                .confidence
                .partial_cmp(&b.detection.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(best)
    }
}

/// ONNX-backed pipeline holding all four models.
pub struct OnnxFaceApi {
    tiny: FaceDetector,
    accurate: FaceDetector,
    landmarks: LandmarkNet,
    recognizer: FaceRecognizer,
}

impl OnnxFaceApi {
    pub fn new(
        tiny: FaceDetector,
        accurate: FaceDetector,
        landmarks: LandmarkNet,
        recognizer: FaceRecognizer,
    ) -> Self {
        Self { tiny, accurate, landmarks, recognizer }
    }

    /// Assemble from individually loaded models, checking each slot's type.
    pub fn from_loaded(
        tiny: LoadedModel,
        landmarks: LoadedModel,
        recognizer: LoadedModel,
        accurate: LoadedModel,
    ) -> Result<Self, FaceApiError> {
        let LoadedModel::Detector(tiny) = tiny else {
            return Err(FaceApiError::MissingModel(ModelKind::TinyDetector));
        };
        let LoadedModel::Landmarks(landmarks) = landmarks else {
            return Err(FaceApiError::MissingModel(ModelKind::FaceLandmark68));
        };
        let LoadedModel::Recognizer(recognizer) = recognizer else {
            return Err(FaceApiError::MissingModel(ModelKind::FaceRecognition));
        };
        let LoadedModel::Detector(accurate) = accurate else {
            return Err(FaceApiError::MissingModel(ModelKind::AccurateDetector));
        };
        Ok(Self::new(tiny, accurate, landmarks, recognizer))
    }

    fn detector(&mut self, kind: DetectorKind) -> &mut FaceDetector {
        match kind {
            DetectorKind::Tiny => &mut self.tiny,
            DetectorKind::Accurate => &mut self.accurate,
        }
    }

    fn describe(
        &mut self,
        frame: FrameView<'_>,
        face: BoundingBox,
    ) -> Result<FaceDetection, FaceApiError> {
        let landmarks = self.landmarks.predict(frame, &face)?;
        let descriptor = self.recognizer.extract(frame, &landmarks.to_five_point())?;
        Ok(FaceDetection {
            detection: face,
            landmarks,
            descriptor,
        })
    }
}

fn check_frame(frame: FrameView<'_>) -> Result<(), FaceApiError> {
    if frame.is_complete() {
        Ok(())
    } else {
        Err(FaceApiError::InvalidFrame {
            width: frame.width,
            height: frame.height,
        })
    }
}

impl FaceApi for OnnxFaceApi {
    fn detect_all(
        &mut self,
        frame: FrameView<'_>,
        detector: DetectorKind,
    ) -> Result<Vec<FaceDetection>, FaceApiError> {
        check_frame(frame)?;
        let faces = self.detector(detector).detect(frame)?;
        faces
            .into_iter()
            .map(|face| self.describe(frame, face))
            .collect()
    }

    fn detect_single(
        &mut self,
        frame: FrameView<'_>,
        detector: DetectorKind,
    ) -> Result<Option<FaceDetection>, FaceApiError> {
        check_frame(frame)?;
        let face = self.detector(detector).detect_single(frame)?;
        face.map(|face| self.describe(frame, face)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaceDescriptor, FaceLandmarks68};

    /// Returns fixed detections regardless of the frame.
    struct FixedApi {
        confidences: Vec<f32>,
    }

    impl FaceApi for FixedApi {
        fn detect_all(
            &mut self,
            _frame: FrameView<'_>,
            _detector: DetectorKind,
        ) -> Result<Vec<FaceDetection>, FaceApiError> {
            Ok(self
                .confidences
                .iter()
                .map(|&c| FaceDetection {
                    detection: BoundingBox {
                        x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: c, landmarks: None,
                    },
                    landmarks: FaceLandmarks68::new(vec![(0.0, 0.0); 68]).unwrap(),
                    descriptor: FaceDescriptor::new(vec![c]),
                })
                .collect())
        }
    }

    #[test]
    fn test_default_detect_single_picks_most_confident() {
        let mut api = FixedApi { confidences: vec![0.6, 0.95, 0.7] };
        let data = [0u8; 4];
        let best = api
            .detect_single(FrameView::new(&data, 2, 2), DetectorKind::Accurate)
            .unwrap()
            .unwrap();
        assert_eq!(best.detection.confidence, 0.95);
    }

    #[test]
    fn test_default_detect_single_none_when_empty() {
        let mut api = FixedApi { confidences: vec![] };
        let data = [0u8; 4];
        let best = api.detect_single(FrameView::new(&data, 2, 2), DetectorKind::Tiny).unwrap();
        assert!(best.is_none());
    }

    #[test]
    fn test_check_frame_rejects_short_buffer() {
        let data = [0u8; 3];
        assert!(matches!(
            check_frame(FrameView::new(&data, 2, 2)),
            Err(FaceApiError::InvalidFrame { width: 2, height: 2 })
        ));
    }
}
