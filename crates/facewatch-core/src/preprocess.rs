//! Grayscale resizing and letterbox geometry shared by the detectors.

/// Scale and padding applied when fitting a frame into a square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub new_width: usize,
    pub new_height: usize,
}

impl Letterbox {
    /// Fit `width × height` inside `input_width × input_height`, preserving aspect ratio.
    pub fn fit(width: usize, height: usize, input_width: usize, input_height: usize) -> Self {
        let scale_w = input_width as f32 / width as f32;
        let scale_h = input_height as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_width = ((width as f32 * scale).round() as usize).min(input_width);
        let new_height = ((height as f32 * scale).round() as usize).min(input_height);

        Self {
            scale,
            pad_x: (input_width - new_width) as f32 / 2.0,
            pad_y: (input_height - new_height) as f32 / 2.0,
            new_width,
            new_height,
        }
    }

    /// Map a point from model-input space back to frame space.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Bilinear resize of a grayscale buffer.
pub fn resize_bilinear(
    frame: &[u8],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<u8> {
    let mut resized = vec![0u8; new_width * new_height];
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return resized;
    }

    let inv_x = width as f32 / new_width as f32;
    let inv_y = height as f32 / new_height as f32;

    for y in 0..new_height {
        let src_y = (y as f32 + 0.5) * inv_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_width {
            let src_x = (x as f32 + 0.5) * inv_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = frame[y0 * width + x0] as f32;
            let tr = frame[y0 * width + x1] as f32;
            let bl = frame[y1 * width + x0] as f32;
            let br = frame[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_width + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_uniform_stays_uniform() {
        let frame = vec![128u8; 100 * 100];
        let resized = resize_bilinear(&frame, 100, 100, 200, 150);
        assert_eq!(resized.len(), 200 * 150);
        assert!(resized.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(640, 480, 640, 640);
        assert_abs_diff_eq!(lb.scale, 1.0);
        assert_eq!(lb.new_width, 640);
        assert_eq!(lb.new_height, 480);
        assert_abs_diff_eq!(lb.pad_x, 0.0);
        assert_abs_diff_eq!(lb.pad_y, 80.0);
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let lb = Letterbox::fit(320, 240, 640, 640);
        let (orig_x, orig_y) = (100.0f32, 50.0f32);
        let boxed = (orig_x * lb.scale + lb.pad_x, orig_y * lb.scale + lb.pad_y);
        let (rx, ry) = lb.unmap(boxed.0, boxed.1);
        assert_abs_diff_eq!(rx, orig_x, epsilon = 0.1);
        assert_abs_diff_eq!(ry, orig_y, epsilon = 0.1);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(resize_bilinear(&[], 0, 0, 4, 4), vec![0u8; 16]);
    }
}
