use crate::video::VideoPublisher;
use facelens_core::Dimensions;
use facelens_hw::{Camera, CameraError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),
    #[error("capture source unavailable: {0}")]
    Unavailable(String),
}

/// A source of live video frames.
pub trait CaptureDevice: Send + 'static {
    /// Open the device, record its dimensions on the publisher and start
    /// streaming frames into it in the background. Blocking.
    ///
    /// Streaming stops on its own once every feed has been dropped.
    fn start(self, publisher: VideoPublisher) -> Result<Dimensions, CaptureError>;
}

/// V4L2 camera at its default resolution.
pub struct V4l2Capture {
    device_path: String,
}

impl V4l2Capture {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }
}

impl CaptureDevice for V4l2Capture {
    fn start(self, publisher: VideoPublisher) -> Result<Dimensions, CaptureError> {
        let camera = Camera::open(&self.device_path)?;
        let dimensions = Dimensions::new(camera.width, camera.height);
        publisher.set_metadata(dimensions);

        std::thread::Builder::new()
            .name("facelens-capture".into())
            .spawn(move || {
                tracing::info!(device = %camera.device_path, "capture thread started");
                match camera.stream(|frame| publisher.publish(frame)) {
                    Ok(frames) => tracing::info!(frames, "capture stopped: video feed dropped"),
                    Err(e) => tracing::error!(error = %e, "capture stopped"),
                }
            })
            .map_err(CaptureError::Spawn)?;

        Ok(dimensions)
    }
}
