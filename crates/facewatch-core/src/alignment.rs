//! Face alignment for descriptor extraction.
//!
//! Fits a 4-DOF similarity transform (scale, rotation, translation) from the
//! five detected landmarks onto the ArcFace reference layout, then warps the
//! face into a 112×112 crop.

/// Side of the aligned crop, in pixels.
pub const ALIGNED_SIZE: usize = 112;

/// ArcFace reference landmarks in a 112×112 crop.
const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Row-major 2×3 similarity matrix `[a, -b, tx, b, a, ty]`.
type Similarity = [f32; 6];

/// Least-squares similarity transform mapping `src` onto `dst`.
///
/// Each point pair contributes two equations in the unknowns `(a, b, tx, ty)`:
/// `sx·a − sy·b + tx = dx` and `sy·a + sx·b + ty = dy`.
fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    let mut normal = [[0.0f32; 5]; 4]; // [AᵀA | Aᵀb]

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        for (row, rhs) in [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)] {
            for j in 0..4 {
                for k in 0..4 {
                    normal[j][k] += row[j] * row[k];
                }
                normal[j][4] += row[j] * rhs;
            }
        }
    }

    let [a, b, tx, ty] = solve(normal).unwrap_or([1.0, 0.0, 0.0, 0.0]);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting on an augmented 4×5 system.
/// Returns `None` when the system is singular.
fn solve(mut m: [[f32; 5]; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    Some(x)
}

/// Warp a grayscale frame through `matrix` into an `out_size²` crop.
/// Bilinear sampling; pixels that map outside the frame are black.
fn warp_affine(frame: &[u8], width: usize, height: usize, matrix: &Similarity, out_size: usize) -> Vec<u8> {
    let (a, tx, b, ty) = (matrix[0], matrix[2], matrix[3], matrix[5]);
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return vec![0u8; out_size * out_size];
    }
    let (ia, ib) = (a / det, b / det);

    let sample = |x: i32, y: i32| -> f32 {
        if x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height {
            frame[y as usize * width + x as usize] as f32
        } else {
            0.0
        }
    };

    let mut output = vec![0u8; out_size * out_size];
    for oy in 0..out_size {
        for ox in 0..out_size {
            let (dx, dy) = (ox as f32 - tx, oy as f32 - ty);
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let (x0, y0) = (sx.floor() as i32, sy.floor() as i32);
            let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            output[oy * out_size + ox] = val.round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Align a detected face to the canonical 112×112 ArcFace crop.
pub fn align_face(frame: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let matrix = estimate_similarity(landmarks, &REFERENCE_LANDMARKS);
    warp_affine(frame, width as usize, height as usize, &matrix, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_transform() {
        let m = estimate_similarity(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS);
        assert_abs_diff_eq!(m[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(m[1], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(m[2], 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(m[3], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(m[5], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_half_scale_transform() {
        let src = REFERENCE_LANDMARKS.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity(&src, &REFERENCE_LANDMARKS);
        assert_abs_diff_eq!(m[0], 0.5, epsilon = 0.01);
    }

    #[test]
    fn test_singular_system_has_no_solution() {
        assert!(solve([[0.0; 5]; 4]).is_none());
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = vec![128u8; 640 * 480];
        let aligned = align_face(&frame, 640, 480, &REFERENCE_LANDMARKS);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE);
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let (w, h) = (200usize, 200usize);
        let mut frame = vec![0u8; w * h];
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // Bright 5×5 patch on the left eye.
        for y in 58..63 {
            for x in 78..83 {
                frame[y * w + x] = 255;
            }
        }

        let aligned = align_face(&frame, w as u32, h as u32, &src);
        let (rx, ry) = (
            REFERENCE_LANDMARKS[0].0.round() as usize,
            REFERENCE_LANDMARKS[0].1.round() as usize,
        );
        let peak = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned[y * ALIGNED_SIZE + x])
            .max()
            .unwrap_or(0);
        assert!(peak > 100, "expected bright patch near ({rx}, {ry}), peak={peak}");
    }
}
