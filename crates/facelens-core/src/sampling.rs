//! Grayscale pixel sampling shared by the detector, landmark and alignment stages.

/// Sample `frame` at a sub-pixel position with bilinear interpolation.
///
/// Out-of-bounds neighbours contribute `fill`.
pub fn bilinear_sample(frame: &[u8], width: usize, height: usize, x: f32, y: f32, fill: f32) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |px: i64, py: i64| -> f32 {
        if px >= 0 && py >= 0 && (px as usize) < width && (py as usize) < height {
            frame[py as usize * width + px as usize] as f32
        } else {
            fill
        }
    };

    at(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + at(x0 + 1, y0) * fx * (1.0 - fy)
        + at(x0, y0 + 1) * (1.0 - fx) * fy
        + at(x0 + 1, y0 + 1) * fx * fy
}

/// Resize a whole grayscale frame to `new_w × new_h` with edge clamping.
pub fn resize_bilinear(
    frame: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    if width == 0 || height == 0 || new_w == 0 || new_h == 0 {
        return vec![0u8; new_w * new_h];
    }
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;

    let mut out = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
        for x in 0..new_w {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            // Clamped coordinates keep every neighbour in bounds except the
            // last row/column, whose weight is zero.
            let v = bilinear_sample(frame, width, height, src_x, src_y, 0.0);
            out[y * new_w + x] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Square region in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareCrop {
    pub x: f32,
    pub y: f32,
    pub side: f32,
}

/// Crop `region` out of the frame and resample it to `out_size × out_size`.
///
/// Parts of the region outside the frame are filled with black.
pub fn crop_resize(
    frame: &[u8],
    width: usize,
    height: usize,
    region: SquareCrop,
    out_size: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; out_size * out_size];
    if out_size == 0 || region.side <= 0.0 {
        return out;
    }
    let step = region.side / out_size as f32;
    for oy in 0..out_size {
        let sy = region.y + (oy as f32 + 0.5) * step - 0.5;
        for ox in 0..out_size {
            let sx = region.x + (ox as f32 + 0.5) * step - 0.5;
            let v = bilinear_sample(frame, width, height, sx, sy, 0.0);
            out[oy * out_size + ox] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
