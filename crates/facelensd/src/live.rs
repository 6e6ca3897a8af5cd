//! The live recognition loop: detect, match and draw on every tick.

use crate::engine::{EngineError, EngineHandle};
use crate::overlay::{DrawBox, OverlayError, RenderSurface};
use crate::video::{wait_until_ready, ReadinessGate, VideoError, VideoFeed};
use facelens_core::{resize_results, DetectorKind, Dimensions, FaceMatcher};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("detection failed: {0}")]
    Engine(#[from] EngineError),
    #[error("overlay failed: {0}")]
    Overlay(#[from] OverlayError),
}

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("video feed never became ready: {0}")]
    NotReady(#[from] VideoError),
    #[error("recognition loop already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub tick_interval: Duration,
    pub detector: DetectorKind,
    /// Overlay size; the video's own dimensions when unset.
    pub display_size: Option<Dimensions>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    /// Ticks with no frame to process.
    pub skipped_ticks: u64,
    pub faces: u64,
}

pub struct RecognitionLoop<S> {
    engine: EngineHandle,
    matcher: Arc<FaceMatcher>,
    feed: VideoFeed,
    overlay: S,
    settings: LiveSettings,
    gate: ReadinessGate,
}

impl<S: RenderSurface> RecognitionLoop<S> {
    pub fn new(
        engine: EngineHandle,
        matcher: Arc<FaceMatcher>,
        feed: VideoFeed,
        overlay: S,
        settings: LiveSettings,
    ) -> Self {
        Self {
            engine,
            matcher,
            feed,
            overlay,
            settings,
            gate: ReadinessGate::new(),
        }
    }

    pub fn overlay(&self) -> &S {
        &self.overlay
    }

    pub fn into_overlay(self) -> S {
        self.overlay
    }

    /// Wait for the feed, then tick until shutdown or until the feed closes.
    ///
    /// Each pass is awaited before the next tick is taken, so passes never
    /// overlap; a slow pass delays the schedule instead of bursting.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<LoopStats, LoopError> {
        let mut stats = LoopStats::default();

        tokio::select! {
            biased;
            ready = wait_until_ready(&self.feed) => {
                let readiness = ready?;
                tracing::debug!(?readiness, "video feed ready");
            }
            _ = shutdown.changed() => {
                tracing::info!("shutdown before video feed became ready");
                return Ok(stats);
            }
        }
        if !self.gate.try_open() {
            return Err(LoopError::AlreadyStarted);
        }

        let display = self.display_size();
        self.overlay.match_dimensions(display);
        tracing::info!(
            width = display.width,
            height = display.height,
            interval_ms = self.settings.tick_interval.as_millis() as u64,
            detector = %self.settings.detector,
            "recognition loop started"
        );

        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }

            stats.ticks += 1;
            match self.tick(display).await {
                Ok(Some(faces)) => stats.faces += faces as u64,
                Ok(None) => stats.skipped_ticks += 1,
                Err(e) => {
                    stats.failed_ticks += 1;
                    tracing::warn!(tick = stats.ticks, error = %e, "recognition tick failed");
                }
            }

            if self.feed.is_closed() {
                tracing::info!("video feed closed");
                break;
            }
        }

        tracing::info!(
            ticks = stats.ticks,
            failed = stats.failed_ticks,
            faces = stats.faces,
            "recognition loop stopped"
        );
        Ok(stats)
    }

    fn display_size(&self) -> Dimensions {
        self.settings
            .display_size
            .or_else(|| self.feed.dimensions())
            .or_else(|| self.feed.current_frame().map(|f| f.dimensions()))
            .unwrap_or_default()
    }

    /// One detect-and-render pass. `None` when there is no frame yet.
    async fn tick(&mut self, display: Dimensions) -> Result<Option<usize>, TickError> {
        let Some(frame) = self.feed.current_frame() else {
            return Ok(None);
        };
        let source = frame.dimensions();

        let detections = self.engine.detect_all(frame, self.settings.detector).await?;
        let detections = resize_results(detections, source, display);

        self.overlay.clear();
        for face in &detections {
            let best = self.matcher.find_best_match(&face.descriptor);
            tracing::trace!(label = %best.label, distance = best.distance, "face matched");
            self.overlay.draw_box(&DrawBox::new(&face.detection, &best));
        }
        self.overlay.present()?;

        Ok(Some(detections.len()))
    }
}
