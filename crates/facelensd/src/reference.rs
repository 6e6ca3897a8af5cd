//! Labeled reference set: one descriptor per successfully processed image.

use crate::config::Identity;
use crate::engine::{EngineError, EngineHandle};
use facelens_core::{DetectorKind, FaceDescriptor, FaceMatcher, LabeledDescriptors, MatcherError};
use facelens_hw::{Frame, FrameError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("face engine unavailable: {0}")]
    Engine(EngineError),
    #[error("reference task failed: {0}")]
    Join(String),
}

/// Where reference images come from. Blocking.
pub trait ImageSource: Send + Sync + 'static {
    fn fetch(&self, identity: &Identity, index: usize) -> Result<Frame, FetchError>;
}

/// Reads `<root>/<label>/<index>.jpg` from disk.
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ImageSource for FsImageSource {
    fn fetch(&self, identity: &Identity, index: usize) -> Result<Frame, FetchError> {
        Ok(Frame::load(&identity.image_path(&self.root, index))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WarningReason {
    Fetch(String),
    Detect(String),
    NoFace,
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Detect(e) => write!(f, "detection failed: {e}"),
            Self::NoFace => f.write_str("no face detected"),
        }
    }
}

/// A reference image that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceWarning {
    pub label: String,
    pub index: usize,
    pub reason: WarningReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub label: String,
    pub descriptors: usize,
}

/// Outcome of a reference build: sets in configuration order plus skipped images.
#[derive(Debug, Clone)]
pub struct ReferenceReport {
    pub sets: Vec<LabeledDescriptors>,
    pub warnings: Vec<ReferenceWarning>,
}

impl ReferenceReport {
    pub fn summary(&self) -> Vec<LabelSummary> {
        self.sets
            .iter()
            .map(|s| LabelSummary {
                label: s.label.clone(),
                descriptors: s.descriptors.len(),
            })
            .collect()
    }

    pub fn into_matcher(self, distance_threshold: f32) -> Result<FaceMatcher, MatcherError> {
        FaceMatcher::new(self.sets, distance_threshold)
    }
}

type LabelOutcome = (LabeledDescriptors, Vec<ReferenceWarning>);

/// Build descriptors for every identity.
///
/// Labels run concurrently, images within a label run in order. A bad image
/// is logged and skipped; only losing the engine is fatal.
pub async fn build_reference_set<S: ImageSource>(
    identities: &[Identity],
    source: Arc<S>,
    engine: EngineHandle,
    detector: DetectorKind,
) -> Result<ReferenceReport, ReferenceError> {
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for (position, identity) in identities.iter().cloned().enumerate() {
        let source = Arc::clone(&source);
        let engine = engine.clone();
        tasks.spawn(async move {
            let outcome = build_label(&identity, source, &engine, detector).await;
            (position, outcome)
        });
    }

    let mut slots: Vec<Option<LabelOutcome>> = identities.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (position, outcome) = joined.map_err(|e| ReferenceError::Join(e.to_string()))?;
        slots[position] = Some(outcome?);
    }

    let mut sets = Vec::with_capacity(slots.len());
    let mut warnings = Vec::new();
    for (set, skipped) in slots.into_iter().flatten() {
        sets.push(set);
        warnings.extend(skipped);
    }

    tracing::info!(
        labels = sets.len(),
        skipped = warnings.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "reference set built"
    );
    Ok(ReferenceReport { sets, warnings })
}

async fn build_label<S: ImageSource>(
    identity: &Identity,
    source: Arc<S>,
    engine: &EngineHandle,
    detector: DetectorKind,
) -> Result<LabelOutcome, ReferenceError> {
    let mut descriptors = Vec::with_capacity(identity.images);
    let mut warnings = Vec::new();

    for index in 1..=identity.images {
        match describe_image(identity, index, &source, engine, detector).await? {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(reason) => {
                tracing::warn!(label = %identity.label, index, %reason, "skipping reference image");
                warnings.push(ReferenceWarning {
                    label: identity.label.clone(),
                    index,
                    reason,
                });
            }
        }
    }

    if descriptors.is_empty() {
        tracing::warn!(label = %identity.label, "no usable reference images; label can never match");
    } else {
        tracing::info!(label = %identity.label, count = descriptors.len(), "label enrolled");
    }
    Ok((LabeledDescriptors::new(identity.label.clone(), descriptors), warnings))
}

/// Outer error is fatal, inner error skips the image.
async fn describe_image<S: ImageSource>(
    identity: &Identity,
    index: usize,
    source: &Arc<S>,
    engine: &EngineHandle,
    detector: DetectorKind,
) -> Result<Result<FaceDescriptor, WarningReason>, ReferenceError> {
    let fetched = {
        let source = Arc::clone(source);
        let identity = identity.clone();
        tokio::task::spawn_blocking(move || source.fetch(&identity, index))
            .await
            .map_err(|e| ReferenceError::Join(e.to_string()))?
    };
    let frame = match fetched {
        Ok(frame) => Arc::new(frame),
        Err(e) => return Ok(Err(WarningReason::Fetch(e.to_string()))),
    };

    match engine.detect_single(frame, detector).await {
        Ok(Some(face)) => Ok(Ok(face.descriptor)),
        Ok(None) => Ok(Err(WarningReason::NoFace)),
        Err(EngineError::Api(e)) => Ok(Err(WarningReason::Detect(e.to_string()))),
        Err(e) => Err(ReferenceError::Engine(e)),
    }
}
