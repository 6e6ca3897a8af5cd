use facelens_core::{
    BoundingBox, DetectorKind, Dimensions, FaceApi, FaceApiError, FaceDescriptor, FaceDetection,
    FaceLandmarks68, FrameView, ModelKind,
};
use facelens_hw::Frame;
use facelensd::capture::{CaptureDevice, CaptureError};
use facelensd::config::{Config, Identity};
use facelensd::loader::{LoadError, ModelLoader, ModelSet};
use facelensd::overlay::ImageOverlay;
use facelensd::reference::{FetchError, ImageSource};
use facelensd::session::{Session, SessionError};
use facelensd::video::VideoPublisher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

type EventLog = Arc<Mutex<Vec<String>>>;

fn log(events: &EventLog, entry: impl Into<String>) {
    events.lock().unwrap().push(entry.into());
}

/// Descriptor is `[pixel / 64]`: a frame of 16s sits 0.5 from a frame of 48s.
struct LoggedApi {
    events: EventLog,
}

impl FaceApi for LoggedApi {
    fn detect_all(
        &mut self,
        frame: FrameView<'_>,
        _detector: DetectorKind,
    ) -> Result<Vec<FaceDetection>, FaceApiError> {
        log(&self.events, "detect");
        let pixel = frame.data.first().copied().unwrap_or(0);
        if pixel == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![FaceDetection {
            detection: BoundingBox {
                x: 4.0, y: 4.0, width: 8.0, height: 8.0, confidence: 0.95, landmarks: None,
            },
            landmarks: FaceLandmarks68::new(vec![(8.0, 8.0); 68]).unwrap(),
            descriptor: FaceDescriptor::new(vec![pixel as f32 / 64.0]),
        }])
    }
}

struct StubLoader {
    events: EventLog,
    available: bool,
}

impl ModelLoader for StubLoader {
    type Model = ModelKind;
    type Api = LoggedApi;

    fn probe(&self) -> Result<(), LoadError> {
        if self.available {
            Ok(())
        } else {
            Err(LoadError::BackendUnavailable("no backend".into()))
        }
    }

    fn load(&self, kind: ModelKind) -> Result<ModelKind, LoadError> {
        std::thread::sleep(Duration::from_millis(20));
        log(&self.events, format!("load:{kind}"));
        Ok(kind)
    }

    fn assemble(&self, _models: ModelSet<ModelKind>) -> Result<LoggedApi, LoadError> {
        Ok(LoggedApi {
            events: Arc::clone(&self.events),
        })
    }
}

/// Streams frames filled with `pixel` every 5 ms until the feed is dropped.
struct StubCapture {
    events: EventLog,
    pixel: u8,
    fail: bool,
}

impl CaptureDevice for StubCapture {
    fn start(self, publisher: VideoPublisher) -> Result<Dimensions, CaptureError> {
        log(&self.events, "camera");
        if self.fail {
            return Err(CaptureError::Unavailable("permission denied".into()));
        }
        let dimensions = Dimensions::new(16, 16);
        publisher.set_metadata(dimensions);
        let pixel = self.pixel;
        std::thread::spawn(move || {
            let mut seq = 0;
            loop {
                seq += 1;
                if !publisher.publish(Frame::new(vec![pixel; 256], 16, 16, seq)) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        Ok(dimensions)
    }
}

/// Every reference image is a frame of 48s; Nico's images are blank.
struct StubImages {
    events: EventLog,
}

impl ImageSource for StubImages {
    fn fetch(&self, identity: &Identity, index: usize) -> Result<Frame, FetchError> {
        log(&self.events, format!("fetch:{}:{index}", identity.label));
        if identity.label == "Nico" {
            return Ok(Frame::new(vec![0; 16], 4, 4, 0));
        }
        Ok(Frame::new(vec![48; 16], 4, 4, 0))
    }
}

fn config() -> Config {
    Config {
        identities: vec![Identity::new("Luke", 3), Identity::new("Nico", 2)],
        tick_interval: Duration::from_millis(10),
        ..Config::default()
    }
}

fn parts(events: &EventLog, fail_camera: bool) -> (Arc<StubLoader>, StubCapture, Arc<StubImages>) {
    (
        Arc::new(StubLoader { events: Arc::clone(events), available: true }),
        StubCapture { events: Arc::clone(events), pixel: 16, fail: fail_camera },
        Arc::new(StubImages { events: Arc::clone(events) }),
    )
}

#[tokio::test]
async fn test_models_load_before_anything_else() {
    let events: EventLog = Arc::default();
    let (loader, capture, images) = parts(&events, false);
    let session = Session::start(&config(), loader, capture, images).await.unwrap();

    let events = events.lock().unwrap().clone();
    let last_load = events.iter().rposition(|e| e.starts_with("load:")).unwrap();
    let first_other = events.iter().position(|e| !e.starts_with("load:")).unwrap();
    assert_eq!(events.iter().filter(|e| e.starts_with("load:")).count(), 4);
    assert!(last_load < first_other, "work started before models loaded: {events:?}");

    // Luke enrolled, Nico present with nothing enrolled.
    let labels: Vec<&str> = session.matcher().labels().collect();
    assert_eq!(labels, vec!["Luke", "Nico"]);
    assert_eq!(session.matcher().labeled_descriptors()[0].descriptors.len(), 3);
    assert_eq!(session.warnings().len(), 2);
    assert_eq!(session.video_dimensions(), Dimensions::new(16, 16));
}

#[tokio::test]
async fn test_live_loop_labels_faces() {
    let events: EventLog = Arc::default();
    let (loader, capture, images) = parts(&events, false);
    let session = Session::start(&config(), loader, capture, images).await.unwrap();

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut live = session.recognition_loop(ImageOverlay::new(None));
    let task = tokio::spawn(async move {
        let stats = live.run(stop_rx).await.unwrap();
        (stats, live.into_overlay())
    });

    tokio::time::sleep(Duration::from_millis(120)).await;
    stop_tx.send(true).unwrap();
    let (stats, overlay) = task.await.unwrap();

    assert!(stats.ticks >= 2);
    assert_eq!(stats.failed_ticks, 0);
    let drawn = overlay.boxes();
    assert_eq!(drawn.len(), 1);
    assert_eq!(drawn[0].label, "Luke (0.5)");
    assert!(drawn[0].known);
}

#[tokio::test]
async fn test_missing_backend_starts_nothing() {
    let events: EventLog = Arc::default();
    let (_, capture, images) = parts(&events, false);
    let loader = Arc::new(StubLoader { events: Arc::clone(&events), available: false });

    let err = Session::start(&config(), loader, capture, images).await.err().unwrap();
    assert!(matches!(err, SessionError::Load(LoadError::BackendUnavailable(_))));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_camera_failure_after_models_is_fatal() {
    let events: EventLog = Arc::default();
    let (loader, capture, images) = parts(&events, true);

    let err = Session::start(&config(), loader, capture, images).await.err().unwrap();
    assert!(matches!(err, SessionError::Capture(CaptureError::Unavailable(_))));
    assert!(events.lock().unwrap().iter().any(|e| e == "camera"));
}

#[tokio::test]
async fn test_session_run_stops_on_shutdown() {
    let events: EventLog = Arc::default();
    let (loader, capture, images) = parts(&events, false);
    let session = Session::start(&config(), loader, capture, images).await.unwrap();

    let stopped = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = watch::channel(false);
    let flag = Arc::clone(&stopped);
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.store(true, Ordering::SeqCst);
        stop_tx.send(true).unwrap();
        stop_tx
    });

    let stats = session.run(ImageOverlay::new(None), stop_rx).await.unwrap();
    assert!(stopped.load(Ordering::SeqCst));
    assert!(stats.ticks >= 1);
    drop(stopper.await.unwrap());
}
