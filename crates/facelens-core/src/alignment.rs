//! Face alignment for the recognition encoder.
//!
//! Fits a 4-DOF similarity transform (scale, rotation, translation) from five
//! detected landmarks to the canonical ArcFace template and warps the face into
//! a 112×112 crop.

use crate::sampling::bilinear_sample;

/// ArcFace template landmarks for a 112×112 crop.
pub const ARCFACE_TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// `dst = [a -b; b a] * src + t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    /// Least-squares fit mapping `src` points onto `dst` points.
    ///
    /// Uses the closed form for the 4-parameter similarity: centre both point
    /// sets, then `a = Σ(s·d) / Σ|s|²`, `b = Σ(s×d) / Σ|s|²`. Degenerate input
    /// (all source points coincident) yields the identity.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            return Self::IDENTITY;
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse mapping, `None` when the transform collapses the plane.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }

    pub fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }
}

/// Warp `frame` through `transform` into an `out_size × out_size` crop.
///
/// Pixels that map outside the source frame are black.
pub fn warp(
    frame: &[u8],
    width: usize,
    height: usize,
    transform: &SimilarityTransform,
    out_size: usize,
) -> Vec<u8> {
    let Some(back) = transform.inverse() else {
        return vec![0u8; out_size * out_size];
    };

    let mut out = vec![0u8; out_size * out_size];
    for oy in 0..out_size {
        for ox in 0..out_size {
            let (sx, sy) = back.apply((ox as f32, oy as f32));
            let v = bilinear_sample(frame, width, height, sx, sy, 0.0);
            out[oy * out_size + ox] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Align a face to the canonical 112×112 ArcFace crop from five landmarks.
pub fn align_face(frame: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let transform = SimilarityTransform::estimate(landmarks, &ARCFACE_TEMPLATE);
    warp(frame, width as usize, height as usize, &transform, ALIGNED_SIZE)
}
