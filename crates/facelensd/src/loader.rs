//! Model loading: all four capabilities, concurrently, before anything else.

use facelens_core::models::{load_model, LoadedModel};
use facelens_core::{FaceApi, ModelKind, OnnxFaceApi};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("face model backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("failed to load {kind}: {reason}")]
    Model { kind: ModelKind, reason: String },
    #[error("loader task for {kind} panicked: {reason}")]
    Join { kind: ModelKind, reason: String },
    #[error("failed to assemble face pipeline: {0}")]
    Assemble(String),
}

/// One loaded model per capability.
pub struct ModelSet<M> {
    pub tiny_detector: M,
    pub face_landmark_68: M,
    pub face_recognition: M,
    pub accurate_detector: M,
}

/// Source of the four model capabilities.
///
/// `load` is blocking and runs on the blocking pool, one call per capability.
pub trait ModelLoader: Send + Sync + 'static {
    type Model: Send + 'static;
    type Api: FaceApi + 'static;

    /// Fail fast when the backend is absent entirely.
    fn probe(&self) -> Result<(), LoadError>;

    fn load(&self, kind: ModelKind) -> Result<Self::Model, LoadError>;

    fn assemble(&self, models: ModelSet<Self::Model>) -> Result<Self::Api, LoadError>;
}

/// Loads the ONNX models from a directory.
pub struct OnnxModelLoader {
    model_dir: PathBuf,
}

impl OnnxModelLoader {
    pub fn new(model_dir: PathBuf) -> Self {
        Self { model_dir }
    }
}

impl ModelLoader for OnnxModelLoader {
    type Model = LoadedModel;
    type Api = OnnxFaceApi;

    fn probe(&self) -> Result<(), LoadError> {
        if self.model_dir.is_dir() {
            Ok(())
        } else {
            Err(LoadError::BackendUnavailable(format!(
                "model directory {} does not exist",
                self.model_dir.display()
            )))
        }
    }

    fn load(&self, kind: ModelKind) -> Result<LoadedModel, LoadError> {
        load_model(kind, &self.model_dir).map_err(|e| LoadError::Model {
            kind,
            reason: e.to_string(),
        })
    }

    fn assemble(&self, models: ModelSet<LoadedModel>) -> Result<OnnxFaceApi, LoadError> {
        OnnxFaceApi::from_loaded(
            models.tiny_detector,
            models.face_landmark_68,
            models.face_recognition,
            models.accurate_detector,
        )
        .map_err(|e| LoadError::Assemble(e.to_string()))
    }
}

/// Load every capability concurrently and assemble the face pipeline.
///
/// Resolves only once all four loads have succeeded; the first failure is
/// returned and nothing is retried.
pub async fn load_models<L: ModelLoader>(loader: Arc<L>) -> Result<L::Api, LoadError> {
    loader.probe()?;

    let started = Instant::now();
    let (tiny_detector, face_landmark_68, face_recognition, accurate_detector) = tokio::try_join!(
        load_one(&loader, ModelKind::TinyDetector),
        load_one(&loader, ModelKind::FaceLandmark68),
        load_one(&loader, ModelKind::FaceRecognition),
        load_one(&loader, ModelKind::AccurateDetector),
    )?;

    let api = loader.assemble(ModelSet {
        tiny_detector,
        face_landmark_68,
        face_recognition,
        accurate_detector,
    })?;
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "all models loaded");
    Ok(api)
}

async fn load_one<L: ModelLoader>(loader: &Arc<L>, kind: ModelKind) -> Result<L::Model, LoadError> {
    let loader = Arc::clone(loader);
    let started = Instant::now();
    let model = tokio::task::spawn_blocking(move || loader.load(kind))
        .await
        .map_err(|e| LoadError::Join {
            kind,
            reason: e.to_string(),
        })??;
    tracing::debug!(model = %kind, elapsed_ms = started.elapsed().as_millis() as u64, "model loaded");
    Ok(model)
}
