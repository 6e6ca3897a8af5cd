//! Startup orchestration and the state the live loop runs against.

use crate::capture::{CaptureDevice, CaptureError};
use crate::config::Config;
use crate::engine::{spawn_engine, EngineError, EngineHandle};
use crate::live::{LiveSettings, LoopError, LoopStats, RecognitionLoop};
use crate::loader::{load_models, LoadError, ModelLoader};
use crate::overlay::RenderSurface;
use crate::reference::{build_reference_set, ImageSource, ReferenceError, ReferenceWarning};
use crate::video::{video_channel, VideoFeed};
use facelens_core::{Dimensions, FaceMatcher, MatcherError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("camera acquisition failed: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("cannot build matcher: {0}")]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error("startup task failed: {0}")]
    Join(String),
}

/// A started pipeline: models loaded, camera streaming, references enrolled.
pub struct Session {
    engine: EngineHandle,
    matcher: Arc<FaceMatcher>,
    feed: VideoFeed,
    video_dimensions: Dimensions,
    warnings: Vec<ReferenceWarning>,
    settings: LiveSettings,
}

impl Session {
    /// Bring the pipeline up in dependency order.
    ///
    /// All four models load first; nothing touches the camera or the
    /// reference images until they have. The camera is then acquired while
    /// the reference set is built. Any fatal error aborts startup and drops
    /// whatever was already started.
    pub async fn start<L, C, S>(
        config: &Config,
        loader: Arc<L>,
        capture: C,
        images: Arc<S>,
    ) -> Result<Self, SessionError>
    where
        L: ModelLoader,
        C: CaptureDevice,
        S: ImageSource,
    {
        let result = Self::try_start(config, loader, capture, images).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "session startup failed");
        }
        result
    }

    async fn try_start<L, C, S>(
        config: &Config,
        loader: Arc<L>,
        capture: C,
        images: Arc<S>,
    ) -> Result<Self, SessionError>
    where
        L: ModelLoader,
        C: CaptureDevice,
        S: ImageSource,
    {
        let started = Instant::now();
        let api = load_models(loader).await?;
        let engine = spawn_engine(api)?;

        let (publisher, feed) = video_channel();
        let camera = async {
            let dimensions = tokio::task::spawn_blocking(move || capture.start(publisher))
                .await
                .map_err(|e| SessionError::Join(e.to_string()))??;
            tracing::info!(width = dimensions.width, height = dimensions.height, "camera acquired");
            Ok::<_, SessionError>(dimensions)
        };
        let references = async {
            Ok::<_, SessionError>(
                build_reference_set(
                    &config.identities,
                    images,
                    engine.clone(),
                    config.reference_detector,
                )
                .await?,
            )
        };
        let (video_dimensions, report) = tokio::try_join!(camera, references)?;

        let warnings = report.warnings.clone();
        let matcher = report.into_matcher(config.distance_threshold)?;
        tracing::info!(
            labels = matcher.labeled_descriptors().len(),
            skipped_images = warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session ready"
        );

        Ok(Self {
            engine,
            matcher: Arc::new(matcher),
            feed,
            video_dimensions,
            warnings,
            settings: LiveSettings {
                tick_interval: config.tick_interval,
                detector: config.live_detector,
                display_size: config.display_size,
            },
        })
    }

    pub fn matcher(&self) -> &FaceMatcher {
        &self.matcher
    }

    pub fn feed(&self) -> &VideoFeed {
        &self.feed
    }

    pub fn video_dimensions(&self) -> Dimensions {
        self.video_dimensions
    }

    /// Reference images skipped during enrollment.
    pub fn warnings(&self) -> &[ReferenceWarning] {
        &self.warnings
    }

    pub fn recognition_loop<R: RenderSurface>(&self, overlay: R) -> RecognitionLoop<R> {
        RecognitionLoop::new(
            self.engine.clone(),
            Arc::clone(&self.matcher),
            self.feed.clone(),
            overlay,
            self.settings.clone(),
        )
    }

    /// Run the live loop on `overlay` until `shutdown` fires or the feed closes.
    pub async fn run<R: RenderSurface>(
        &self,
        overlay: R,
        shutdown: watch::Receiver<bool>,
    ) -> Result<LoopStats, SessionError> {
        let mut live = self.recognition_loop(overlay);
        Ok(live.run(shutdown).await?)
    }
}
