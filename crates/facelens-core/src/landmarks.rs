//! 68-point facial landmark regressor via ONNX Runtime.
//!
//! Takes a square crop around a detected face, resampled to 112×112, and
//! regresses 68 (x, y) pairs normalized to the crop.

use crate::sampling::{crop_resize, SquareCrop};
use crate::types::{BoundingBox, FaceLandmarks68, FrameView, LANDMARK_POINTS};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: usize = 112;
/// Crop side relative to the larger side of the detection box.
const LANDMARK_CROP_SCALE: f32 = 1.2;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 68-point landmark model.
pub struct LandmarkNet {
    session: Session,
}

impl LandmarkNet {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded 68-point landmark model");

        Ok(Self { session })
    }

    /// Predict 68 landmarks for one detected face, in frame coordinates.
    pub fn predict(
        &mut self,
        frame: FrameView<'_>,
        face: &BoundingBox,
    ) -> Result<FaceLandmarks68, LandmarkError> {
        let crop = crop_region(face);
        let pixels = crop_resize(
            frame.data,
            frame.width as usize,
            frame.height as usize,
            crop,
            LANDMARK_INPUT_SIZE,
        );
        let input = preprocess(&pixels);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        decode(raw, crop)
    }
}

/// Square crop centred on the detection, enlarged to include the jaw line.
fn crop_region(face: &BoundingBox) -> SquareCrop {
    let side = face.width.max(face.height) * LANDMARK_CROP_SCALE;
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    SquareCrop {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        side,
    }
}

/// Scale pixels to [0, 1] and replicate gray into three channels.
fn preprocess(crop: &[u8]) -> Array4<f32> {
    let size = LANDMARK_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let v = crop.get(y * size + x).copied().unwrap_or(0) as f32 / 255.0;
            for c in 0..3 {
                tensor[[0, c, y, x]] = v;
            }
        }
    }
    tensor
}

/// Map crop-normalized outputs back into frame coordinates.
fn decode(raw: &[f32], crop: SquareCrop) -> Result<FaceLandmarks68, LandmarkError> {
    if raw.len() < LANDMARK_POINTS * 2 {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected {} landmark values, got {}",
            LANDMARK_POINTS * 2,
            raw.len()
        )));
    }
    let points = raw[..LANDMARK_POINTS * 2]
        .chunks_exact(2)
        .map(|p| (crop.x + p[0] * crop.side, crop.y + p[1] * crop.side))
        .collect();
    FaceLandmarks68::new(points)
        .ok_or_else(|| LandmarkError::InferenceFailed("landmark count mismatch".into()))
}
