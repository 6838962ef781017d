//! Grayscale frames: pixel-format conversion, dark detection, CLAHE.

use crate::camera::DARK_FRAME_THRESHOLD;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&data, DARK_FRAME_THRESHOLD);
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        }
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// Copy of the pixels with CLAHE applied, for detector input.
    pub fn enhanced(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        clahe_enhance(&mut data, self.width, self.height, 8, 0.02);
        data
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Packed YUYV 4:2:2 (`[Y0, U, Y1, V]`) to grayscale: every even byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    check_len(yuyv, expected)?;
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// 8-bit GREY, trimmed to the frame size.
pub fn grey_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    check_len(buf, expected)?;
    Ok(buf[..expected].to_vec())
}

/// 16-bit little-endian grayscale to 8-bit, keeping the high byte.
pub fn y16_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    check_len(buf, expected)?;
    Ok(buf[..expected]
        .chunks_exact(2)
        .map(|px| (u16::from_le_bytes([px[0], px[1]]) >> 8) as u8)
        .collect())
}

/// True when more than `threshold_pct` of pixels fall below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < 32).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

/// Contrast-Limited Adaptive Histogram Equalization, in place.
///
/// Splits the image into a `tiles × tiles` grid, builds a clipped CDF per
/// tile and interpolates bilinearly between neighbouring tile CDFs.
pub fn clahe_enhance(gray: &mut [u8], width: u32, height: u32, tiles: u32, clip_limit: f32) {
    let (w, h, t) = (width as usize, height as usize, tiles as usize);
    if w == 0 || h == 0 || t == 0 || gray.len() < w * h {
        return;
    }
    let (tile_w, tile_h) = (w / t, h / t);
    if tile_w == 0 || tile_h == 0 {
        return;
    }

    let cdfs: Vec<[f32; 256]> = (0..t * t)
        .map(|i| tile_cdf(gray, w, (i % t) * tile_w, (i / t) * tile_h, tile_w, tile_h, clip_limit))
        .collect();

    for y in 0..h {
        let fy = (y as f32 / tile_h as f32 - 0.5).clamp(0.0, (t - 1) as f32);
        let (r0, dy) = (fy as usize, fy.fract());
        let r1 = (r0 + 1).min(t - 1);

        for x in 0..w {
            let fx = (x as f32 / tile_w as f32 - 0.5).clamp(0.0, (t - 1) as f32);
            let (c0, dx) = (fx as usize, fx.fract());
            let c1 = (c0 + 1).min(t - 1);

            let p = gray[y * w + x] as usize;
            let top = cdfs[r0 * t + c0][p] * (1.0 - dx) + cdfs[r0 * t + c1][p] * dx;
            let bot = cdfs[r1 * t + c0][p] * (1.0 - dx) + cdfs[r1 * t + c1][p] * dx;
            gray[y * w + x] = (top * (1.0 - dy) + bot * dy).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Clipped, redistributed and normalized CDF of one tile.
fn tile_cdf(gray: &[u8], stride: usize, x0: usize, y0: usize, tw: usize, th: usize, clip_limit: f32) -> [f32; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y0 + th {
        for &p in &gray[y * stride + x0..y * stride + x0 + tw] {
            hist[p as usize] += 1;
        }
    }

    let pixels = tw * th;
    let clip = (clip_limit * pixels as f32) as u32;
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let (share, leftover) = (excess / 256, (excess % 256) as usize);
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < leftover);
    }

    let mut cdf = [0f32; 256];
    let mut acc = 0f32;
    for (slot, &count) in cdf.iter_mut().zip(hist.iter()) {
        acc += count as f32;
        *slot = acc;
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0.0).unwrap_or(0.0);
    let denom = pixels as f32 - cdf_min;
    if denom > 0.0 {
        for v in cdf.iter_mut() {
            *v = ((*v - cdf_min) / denom * 255.0).clamp(0.0, 255.0);
        }
    }
    cdf
}
