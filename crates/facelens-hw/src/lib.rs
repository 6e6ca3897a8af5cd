//! facelens-hw — Camera capture and frame decoding.
//!
//! Provides V4L2-based camera streaming into grayscale frames, and decoding
//! of still reference images into the same frame type.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
