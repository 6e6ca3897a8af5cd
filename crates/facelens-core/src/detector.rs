//! SCRFD face detector via ONNX Runtime.
//!
//! One implementation serves both detector capabilities: the tiny model
//! (`det_500m`) runs at a 320 px input, the accurate model (`det_10g`) at 640 px.
//! Decoding is 3-stride anchor-free with NMS post-processing.

use crate::sampling::resize_bilinear;
use crate::types::{BoundingBox, DetectorKind, FrameView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Per-variant detector settings.
#[derive(Debug, Clone, Copy)]
struct DetectorProfile {
    input_size: usize,
    score_threshold: f32,
}

impl DetectorProfile {
    fn for_kind(kind: DetectorKind) -> Self {
        match kind {
            DetectorKind::Tiny => Self { input_size: 320, score_threshold: 0.5 },
            DetectorKind::Accurate => Self { input_size: 640, score_threshold: 0.5 },
        }
    }
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn to_frame(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    kind: DetectorKind,
    profile: DetectorProfile,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load an SCRFD ONNX model for the given detector variant.
    pub fn load(model_path: &Path, kind: DetectorKind) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            detector = %kind,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            kind,
            profile: DetectorProfile::for_kind(kind),
            stride_indices,
        })
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    /// Detect every face in a grayscale frame, sorted by descending confidence.
    pub fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<BoundingBox>, DetectorError> {
        let size = self.profile.input_size;
        let (input, letterbox) = preprocess(frame, size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                StrideOutputs { scores, bboxes, kps },
                stride,
                size,
                &letterbox,
                self.profile.score_threshold,
            ));
        }

        Ok(nms(all_detections, SCRFD_NMS_THRESHOLD))
    }

    /// Detect the single most confident face, if any.
    pub fn detect_single(
        &mut self,
        frame: FrameView<'_>,
    ) -> Result<Option<BoundingBox>, DetectorError> {
        Ok(self.detect(frame)?.into_iter().next())
    }
}

/// Letterbox a grayscale frame into a square NCHW tensor normalized for SCRFD.
fn preprocess(frame: FrameView<'_>, size: usize) -> (Array4<f32>, LetterboxInfo) {
    let width = frame.width as usize;
    let height = frame.height as usize;

    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;

    let resized = resize_bilinear(frame.data, width, height, new_w, new_h);

    let x_start = pad_x.floor() as usize;
    let y_start = pad_y.floor() as usize;

    // Padding is zero after normalization, which is what zeros() already holds.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..new_h {
        for x in 0..new_w {
            let v = (resized[y * new_w + x] as f32 - SCRFD_MEAN) / SCRFD_STD;
            let (ty, tx) = (y + y_start, x + x_start);
            tensor[[0, 0, ty, tx]] = v;
            tensor[[0, 1, ty, tx]] = v;
            tensor[[0, 2, ty, tx]] = v;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Map output tensors to stride slots by name ("score_8", "bbox_16", ...).
///
/// Exports with generic numeric names fall back to positional ordering:
/// [0-2] scores, [3-5] bboxes, [6-8] kps, each for strides 8/16/32.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named.and_then(|v| <[StrideOutputIndices; 3]>::try_from(v).ok()) {
        Some(indices) => {
            tracing::debug!("SCRFD: using name-based output tensor mapping");
            indices
        }
        None => {
            tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for a single stride level.
fn decode_stride(
    out: StrideOutputs<'_>,
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = out.scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * s;
        let anchor_y = (cell / grid) as f32 * s;

        let Some(d) = out.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = letterbox.to_frame((anchor_x - d[0] * s, anchor_y - d[1] * s));
        let (x2, y2) = letterbox.to_frame((anchor_x + d[2] * s, anchor_y + d[3] * s));

        let landmarks = out.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                letterbox.to_frame((anchor_x + k[i * 2] * s, anchor_y + k[i * 2 + 1] * s))
            })
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression; output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter_area = inter_w * inter_h;
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, side: f32, confidence: f32) -> BoundingBox {
        BoundingBox { x, y, width: side, height: side, confidence, landmarks: None }
    }

    #[test]
    fn test_iou_cases() {
        let a = face(0.0, 0.0, 40.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &face(100.0, 0.0, 40.0, 1.0)), 0.0);
        // half-width shift: 800 shared over 2400 covered
        let shifted = face(20.0, 0.0, 40.0, 1.0);
        assert!((iou(&a, &shifted) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(iou(&face(0.0, 0.0, 0.0, 1.0), &face(0.0, 0.0, 0.0, 1.0)), 0.0);
    }

    #[test]
    fn test_nms_keeps_strongest_of_each_cluster() {
        // Two faces in one frame, the left one detected twice.
        let result = nms(
            vec![
                face(300.0, 120.0, 80.0, 0.62),
                face(104.0, 98.0, 90.0, 0.71),
                face(100.0, 100.0, 90.0, 0.93),
            ],
            SCRFD_NMS_THRESHOLD,
        );
        let kept: Vec<f32> = result.iter().map(|b| b.confidence).collect();
        assert_eq!(kept, vec![0.93, 0.62]);
        assert!(nms(Vec::new(), SCRFD_NMS_THRESHOLD).is_empty());
    }

    #[test]
    fn test_decode_stride_maps_through_letterbox() {
        // 32-stride grid at 64 px input: 2x2 cells, 2 anchors each.
        let mut scores = vec![0.0f32; 8];
        scores[3] = 0.9; // cell 1 → anchor (32, 0)
        let mut bboxes = vec![0.0f32; 32];
        bboxes[12..16].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);
        let kps = vec![0.0f32; 80];
        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 8.0 };

        let dets = decode_stride(
            StrideOutputs { scores: &scores, bboxes: &bboxes, kps: &kps },
            32,
            64,
            &letterbox,
            0.5,
        );

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // x1 = (32 - 16) / 2, y1 = (0 - 8) / 2, x2 = (32 + 16) / 2, y2 = (32 - 8) / 2
        assert_eq!((d.x, d.y, d.width, d.height), (8.0, -4.0, 16.0, 16.0));
        assert_eq!(d.landmarks.unwrap()[0], (16.0, -4.0));
    }

    #[test]
    fn test_preprocess_letterbox_padding() {
        let data = vec![255u8; 64 * 32];
        let (tensor, lb) = preprocess(FrameView::new(&data, 64, 32), 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(lb.scale, 1.0);
        assert_eq!(lb.pad_y, 16.0);
        // padding row normalizes to zero, content row does not
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!(tensor[[0, 0, 20, 10]] > 0.9);
    }

    #[test]
    fn test_output_indices_by_name_or_position() {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let grouped = strings(&[
            "kps_8", "score_8", "bbox_8", "kps_16", "score_16", "bbox_16", "kps_32", "score_32", "bbox_32",
        ]);
        assert_eq!(discover_output_indices(&grouped), [(1, 2, 0), (4, 5, 3), (7, 8, 6)]);

        // one unrecognized name forces positional mapping for all strides
        let mut partial = grouped.clone();
        partial[4] = "448".into();
        let positional = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
        assert_eq!(discover_output_indices(&partial), positional);
        assert_eq!(discover_output_indices(&strings(&["a"; 9])), positional);
    }

    #[test]
    fn test_profiles_differ_by_input_size() {
        assert_eq!(DetectorProfile::for_kind(DetectorKind::Tiny).input_size, 320);
        assert_eq!(DetectorProfile::for_kind(DetectorKind::Accurate).input_size, 640);
    }
}
