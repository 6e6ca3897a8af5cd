//! The four model capabilities and their on-disk layout.

use crate::detector::{DetectorError, FaceDetector};
use crate::landmarks::{LandmarkError, LandmarkNet};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectorKind;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Asset root used when no model directory is configured.
pub const DEFAULT_MODEL_DIR: &str = "face-api/models";

pub fn default_model_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_DIR)
}

/// One loadable model capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    TinyDetector,
    FaceLandmark68,
    FaceRecognition,
    AccurateDetector,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::TinyDetector,
        ModelKind::FaceLandmark68,
        ModelKind::FaceRecognition,
        ModelKind::AccurateDetector,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::TinyDetector => "det_500m.onnx",
            ModelKind::FaceLandmark68 => "landmark_68.onnx",
            ModelKind::FaceRecognition => "w600k_r50.onnx",
            ModelKind::AccurateDetector => "det_10g.onnx",
        }
    }

    pub fn path_in(self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.file_name())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::TinyDetector => "tiny_detector",
            ModelKind::FaceLandmark68 => "face_landmark_68",
            ModelKind::FaceRecognition => "face_recognition",
            ModelKind::AccurateDetector => "accurate_detector",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A single loaded ONNX model, tagged by capability.
pub enum LoadedModel {
    Detector(FaceDetector),
    Landmarks(LandmarkNet),
    Recognizer(FaceRecognizer),
}

/// Load the model file for `kind` from `model_dir`. Blocking.
pub fn load_model(kind: ModelKind, model_dir: &Path) -> Result<LoadedModel, ModelError> {
    let path = kind.path_in(model_dir);
    let model = match kind {
        ModelKind::TinyDetector => {
            LoadedModel::Detector(FaceDetector::load(&path, DetectorKind::Tiny)?)
        }
        ModelKind::AccurateDetector => {
            LoadedModel::Detector(FaceDetector::load(&path, DetectorKind::Accurate)?)
        }
        ModelKind::FaceLandmark68 => LoadedModel::Landmarks(LandmarkNet::load(&path)?),
        ModelKind::FaceRecognition => LoadedModel::Recognizer(FaceRecognizer::load(&path)?),
    };
    Ok(model)
}

/// Presence of each model file under `model_dir`.
pub fn model_inventory(model_dir: &Path) -> Vec<(ModelKind, PathBuf, bool)> {
    ModelKind::ALL
        .iter()
        .map(|&kind| {
            let path = kind.path_in(model_dir);
            let present = path.is_file();
            (kind, path, present)
        })
        .collect()
}
