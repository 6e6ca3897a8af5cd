use facelens_core::{DetectorKind, FaceApi, FaceApiError, FaceDetection};
use facelens_hw::Frame;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending requests the engine thread will queue before senders wait.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face pipeline error: {0}")]
    Api(#[from] FaceApiError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async tasks to the engine thread.
enum EngineRequest {
    DetectAll {
        frame: Arc<Frame>,
        detector: DetectorKind,
        reply: oneshot::Sender<Result<Vec<FaceDetection>, EngineError>>,
    },
    DetectSingle {
        frame: Arc<Frame>,
        detector: DetectorKind,
        reply: oneshot::Sender<Result<Option<FaceDetection>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// The thread exits, dropping its models, once every handle is gone.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect and describe every face in `frame`.
    pub async fn detect_all(
        &self,
        frame: Arc<Frame>,
        detector: DetectorKind,
    ) -> Result<Vec<FaceDetection>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::DetectAll {
                frame,
                detector,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Detect and describe the most confident face in `frame`.
    pub async fn detect_single(
        &self,
        frame: Arc<Frame>,
        detector: DetectorKind,
    ) -> Result<Option<FaceDetection>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::DetectSingle {
                frame,
                detector,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Move a fully loaded face pipeline onto a dedicated OS thread.
///
/// Inference is blocking and needs `&mut` access, so all requests are
/// serialized through this one thread.
pub fn spawn_engine<A>(mut api: A) -> Result<EngineHandle, EngineError>
where
    A: FaceApi + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facelens-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::DetectAll {
                        frame,
                        detector,
                        reply,
                    } => {
                        let result = api.detect_all(frame.view(), detector).map_err(EngineError::from);
                        if let Ok(faces) = &result {
                            tracing::trace!(seq = frame.sequence, faces = faces.len(), "detect_all");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::DetectSingle {
                        frame,
                        detector,
                        reply,
                    } => {
                        let result = api.detect_single(frame.view(), detector).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
