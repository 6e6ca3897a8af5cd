//! Overlay surface the recognition loop draws labeled boxes onto.

use ab_glyph::{FontRef, PxScale};
use facelens_core::{BoundingBox, Dimensions, FaceMatch};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::PathBuf;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;
use thiserror::Error;

/// DejaVu Sans, see `assets/DejaVuSans.LICENSE`.
static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const KNOWN_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
const UNKNOWN_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_BAR_HEIGHT: u32 = 14;
const LABEL_TEXT_SCALE: f32 = 12.0;
const LABEL_PADDING: u32 = 2;
const LINE_WIDTH: u32 = 2;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to spawn snapshot writer: {0}")]
    Spawn(std::io::Error),
    #[error("snapshot writer exited")]
    WriterClosed,
}

/// A labeled box in display coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// `label (distance)` text for the box.
    pub label: String,
    pub known: bool,
}

impl DrawBox {
    pub fn new(face: &BoundingBox, best: &FaceMatch) -> Self {
        Self {
            x: face.x,
            y: face.y,
            width: face.width,
            height: face.height,
            label: best.to_string(),
            known: !best.is_unknown(),
        }
    }
}

/// 2D drawing target sized to the video.
pub trait RenderSurface: Send + 'static {
    fn match_dimensions(&mut self, dimensions: Dimensions);

    fn clear(&mut self);

    fn draw_box(&mut self, draw: &DrawBox);

    /// Called once per tick after all boxes are drawn.
    fn present(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }
}

/// In-memory RGBA overlay, optionally written to a PNG after every tick.
///
/// Snapshots are encoded on a dedicated writer thread; while it is still busy
/// with the previous one, newer snapshots are dropped.
pub struct ImageOverlay {
    canvas: RgbaImage,
    boxes: Vec<DrawBox>,
    font: Option<FontRef<'static>>,
    snapshot: Option<PathBuf>,
    writer: Option<SnapshotWriter>,
}

impl ImageOverlay {
    pub fn new(snapshot: Option<PathBuf>) -> Self {
        let font = match FontRef::try_from_slice(LABEL_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(error = %e, "label font unusable; boxes will be drawn without text");
                None
            }
        };
        Self {
            canvas: RgbaImage::new(0, 0),
            boxes: Vec::new(),
            font,
            snapshot,
            writer: None,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.canvas.width(), self.canvas.height())
    }

    /// Boxes drawn since the last clear.
    pub fn boxes(&self) -> &[DrawBox] {
        &self.boxes
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }
}

impl RenderSurface for ImageOverlay {
    fn match_dimensions(&mut self, dimensions: Dimensions) {
        if self.dimensions() != dimensions {
            self.canvas = RgbaImage::new(dimensions.width, dimensions.height);
        }
        self.boxes.clear();
    }

    fn clear(&mut self) {
        self.canvas.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
        self.boxes.clear();
    }

    fn draw_box(&mut self, draw: &DrawBox) {
        let color = if draw.known { KNOWN_COLOR } else { UNKNOWN_COLOR };
        let x = draw.x.round() as i32;
        let y = draw.y.round() as i32;
        let w = draw.width.round().max(1.0) as u32;
        let h = draw.height.round().max(1.0) as u32;

        for inset in 0..LINE_WIDTH.min(w.min(h) / 2) {
            let i = inset as i32;
            let rect = Rect::at(x + i, y + i).of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(&mut self.canvas, rect, color);
        }

        // Label bar sits on the bottom edge inside the box and widens to fit the text.
        let scale = PxScale::from(LABEL_TEXT_SCALE);
        let text_w = match &self.font {
            Some(font) if !draw.label.is_empty() => text_size(scale, font, &draw.label).0,
            _ => 0,
        };
        let bar_h = LABEL_BAR_HEIGHT.min(h);
        let bar_w = w.max(text_w + 2 * LABEL_PADDING);
        let bar_y = y + (h - bar_h) as i32;
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x, bar_y).of_size(bar_w, bar_h), color);

        if let Some(font) = &self.font {
            if !draw.label.is_empty() {
                let p = LABEL_PADDING as i32;
                draw_text_mut(&mut self.canvas, TEXT_COLOR, x + p, bar_y + 1, scale, font, &draw.label);
            }
        }

        self.boxes.push(draw.clone());
    }

    fn present(&mut self) -> Result<(), OverlayError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        if self.writer.is_none() {
            self.writer = Some(SnapshotWriter::spawn(path.clone())?);
        }
        match &self.writer {
            Some(writer) => writer.submit(self.canvas.clone()),
            None => Ok(()),
        }
    }
}

/// Background PNG encoder for overlay snapshots.
struct SnapshotWriter {
    tx: Option<SyncSender<RgbaImage>>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    fn spawn(path: PathBuf) -> Result<Self, OverlayError> {
        let (tx, rx) = mpsc::sync_channel::<RgbaImage>(1);
        let handle = std::thread::Builder::new()
            .name("facelens-overlay".into())
            .spawn(move || {
                for canvas in rx {
                    if let Err(e) = canvas.save(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to write overlay snapshot");
                    }
                }
            })
            .map_err(OverlayError::Spawn)?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn submit(&self, canvas: RgbaImage) -> Result<(), OverlayError> {
        let Some(tx) = &self.tx else {
            return Err(OverlayError::WriterClosed);
        };
        match tx.try_send(canvas) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::trace!("snapshot writer busy, skipping frame");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(OverlayError::WriterClosed),
        }
    }
}

/// Flushes the pending snapshot before returning.
impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
