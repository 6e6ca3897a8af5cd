//! The live video feed: latest frame, readiness state and readiness events.
//!
//! A capture thread owns the [`VideoPublisher`]; consumers hold cloneable
//! [`VideoFeed`]s. The feed closes when the publisher is dropped.

use facelens_core::Dimensions;
use facelens_hw::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VideoError {
    #[error("video feed closed before it became ready")]
    Closed,
}

/// How much of the stream is available, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveEnoughData,
}

/// Readiness events, emitted once each when the first frame arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEvent {
    LoadedData,
    Play,
}

/// Why [`wait_until_ready`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    AlreadyReady,
    Event(VideoEvent),
}

#[derive(Default)]
struct FeedState {
    dimensions: Option<Dimensions>,
    frame: Option<Arc<Frame>>,
}

/// Writing end of the feed.
pub struct VideoPublisher {
    state: watch::Sender<FeedState>,
    events: broadcast::Sender<VideoEvent>,
}

/// Reading end of the feed.
#[derive(Clone)]
pub struct VideoFeed {
    state: watch::Receiver<FeedState>,
    events: broadcast::Sender<VideoEvent>,
}

/// Create a connected publisher/feed pair with nothing loaded yet.
pub fn video_channel() -> (VideoPublisher, VideoFeed) {
    let (state_tx, state_rx) = watch::channel(FeedState::default());
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    (
        VideoPublisher {
            state: state_tx,
            events: events.clone(),
        },
        VideoFeed {
            state: state_rx,
            events,
        },
    )
}

impl VideoPublisher {
    /// Record stream dimensions once the device is open.
    pub fn set_metadata(&self, dimensions: Dimensions) {
        self.state.send_modify(|s| s.dimensions = Some(dimensions));
    }

    /// Replace the current frame. Returns `false` once every feed is gone.
    pub fn publish(&self, frame: Frame) -> bool {
        if self.state.is_closed() {
            return false;
        }
        let mut first = false;
        self.state.send_modify(|s| {
            first = s.frame.is_none();
            if s.dimensions.is_none() {
                s.dimensions = Some(frame.dimensions());
            }
            s.frame = Some(Arc::new(frame));
        });
        if first {
            // No subscribers yet is fine: late waiters see the ready state.
            let _ = self.events.send(VideoEvent::LoadedData);
            let _ = self.events.send(VideoEvent::Play);
        }
        true
    }
}

impl VideoFeed {
    pub fn ready_state(&self) -> ReadyState {
        let state = self.state.borrow();
        match (&state.frame, state.dimensions) {
            (Some(_), _) => ReadyState::HaveEnoughData,
            (None, Some(_)) => ReadyState::HaveMetadata,
            (None, None) => ReadyState::HaveNothing,
        }
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.state.borrow().frame.clone()
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.state.borrow().dimensions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VideoEvent> {
        self.events.subscribe()
    }

    /// True once the publisher has been dropped.
    pub fn is_closed(&self) -> bool {
        self.state.has_changed().is_err()
    }
}

/// Wait until the feed can supply a frame.
///
/// Returns immediately when the feed already has current data; otherwise
/// resolves on the first `LoadedData` or `Play` event.
pub async fn wait_until_ready(feed: &VideoFeed) -> Result<Readiness, VideoError> {
    // Subscribe before checking the state so an event fired in between is not lost.
    let mut events = feed.subscribe();
    let mut state = feed.state.clone();

    if feed.ready_state() >= ReadyState::HaveCurrentData {
        return Ok(Readiness::AlreadyReady);
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => return Ok(Readiness::Event(event)),
                Err(RecvError::Lagged(_)) => {
                    if feed.ready_state() >= ReadyState::HaveCurrentData {
                        return Ok(Readiness::AlreadyReady);
                    }
                }
                Err(RecvError::Closed) => return Err(VideoError::Closed),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    return Err(VideoError::Closed);
                }
            }
        }
    }
}

/// One-shot latch guarding the start of the recognition loop.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    opened: AtomicBool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` for the first caller only.
    pub fn try_open(&self) -> bool {
        !self.opened.swap(true, Ordering::AcqRel)
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }
}
