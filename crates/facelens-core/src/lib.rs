//! facelens-core — Face detection, landmarks, descriptors and labeled matching.
//!
//! Uses SCRFD for face detection (a tiny and an accurate variant), a 68-point
//! landmark regressor, and ArcFace for face descriptors, all running via ONNX
//! Runtime for CPU inference. The [`FaceApi`] trait is the seam the rest of the
//! workspace talks to.

pub mod alignment;
pub mod api;
pub mod detector;
pub mod landmarks;
pub mod matcher;
pub mod models;
pub mod recognizer;
pub mod sampling;
pub mod types;

pub use api::{FaceApi, FaceApiError, OnnxFaceApi};
pub use matcher::{FaceMatch, FaceMatcher, LabeledDescriptors, MatcherError};
pub use models::{default_model_dir, ModelKind};
pub use types::{
    resize_results, BoundingBox, DetectorKind, Dimensions, FaceDescriptor, FaceDetection,
    FaceLandmarks68, FrameView,
};
