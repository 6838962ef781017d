//! Detection overlay rendering.
//!
//! Every call repaints from scratch: the grayscale frame becomes the RGB
//! background, then each face gets a gradient fill, an outline, a label
//! banner with a confidence bar, and optional decoration.

use crate::types::{Category, RecognizedFace};
use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_polygon_mut, draw_text_mut, text_size};
use imageproc::point::Point;
use imageproc::rect::Rect;

const USER_COLOR: Rgb<u8> = Rgb([46, 204, 113]);
const CELEBRITY_COLOR: Rgb<u8> = Rgb([241, 196, 15]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([231, 76, 60]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const MARKER_COLOR: Rgb<u8> = Rgb([155, 89, 182]);

const GRADIENT_TOP_ALPHA: f32 = 0.05;
const GRADIENT_BOTTOM_ALPHA: f32 = 0.35;
const BANNER_HEIGHT_NO_FONT: u32 = 8;
const CONFIDENCE_BAR_HEIGHT: u32 = 3;
const MARKER_RADIUS: i32 = 6;

#[derive(Clone, Default)]
pub struct OverlayStyle {
    /// Font for label text. Without one, banners carry only the confidence bar.
    pub font: Option<FontArc>,
    pub text_scale: f32,
    /// Identity decorated with a marker above its box.
    pub distinguished_id: Option<String>,
}

impl OverlayStyle {
    pub fn new(font: Option<FontArc>, distinguished_id: Option<String>) -> Self {
        Self {
            font,
            text_scale: 16.0,
            distinguished_id,
        }
    }
}

pub fn category_color(category: Category) -> Rgb<u8> {
    match category {
        Category::User => USER_COLOR,
        Category::Celebrity => CELEBRITY_COLOR,
        Category::Unknown => UNKNOWN_COLOR,
    }
}

/// Label text drawn above a face.
pub fn label_text(face: &RecognizedFace) -> String {
    format!("{} {:.0}%", face.name, face.score() * 100.0)
}

/// Repaint `frame` (grayscale, `width × height`) with the given faces.
pub fn render(frame: &[u8], width: u32, height: u32, faces: &[RecognizedFace], style: &OverlayStyle) -> RgbImage {
    let mut canvas = match GrayImage::from_raw(width, height, frame.to_vec()) {
        Some(gray) => image::DynamicImage::ImageLuma8(gray).to_rgb8(),
        None => {
            tracing::debug!(width, height, len = frame.len(), "frame size mismatch; rendering on blank canvas");
            RgbImage::new(width, height)
        }
    };

    for face in faces {
        draw_face(&mut canvas, face, style);
    }
    canvas
}

/// Box clamped to the canvas as (x, y, width, height), or `None` if too small to draw.
fn clamp_box(face: &RecognizedFace, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
    let b = &face.bounding_box;
    let x0 = b.x.max(0.0).floor() as i64;
    let y0 = b.y.max(0.0).floor() as i64;
    let x1 = ((b.x + b.width).min(width as f32)).ceil() as i64;
    let y1 = ((b.y + b.height).min(height as f32)).ceil() as i64;

    if x1 - x0 < 2 || y1 - y0 < 2 {
        return None;
    }
    Some((x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32))
}

fn draw_face(canvas: &mut RgbImage, face: &RecognizedFace, style: &OverlayStyle) {
    let Some((x, y, w, h)) = clamp_box(face, canvas.width(), canvas.height()) else {
        return;
    };
    let color = category_color(face.category);

    fill_gradient(canvas, (x, y, w, h), color);

    draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), color);
    if w > 2 && h > 2 {
        draw_hollow_rect_mut(canvas, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), color);
    }

    let banner_top = draw_banner(canvas, face, style, (x, y, w), color);

    if style.distinguished_id.as_deref() == Some(face.id.as_str()) && face.is_known() {
        draw_marker(canvas, x + w as i32 / 2, banner_top - MARKER_RADIUS - 2);
    }
}

/// Vertical gradient, faint at the top of the box and stronger at the bottom.
fn fill_gradient(canvas: &mut RgbImage, (x, y, w, h): (i32, i32, u32, u32), color: Rgb<u8>) {
    for row in 0..h {
        let t = row as f32 / h as f32;
        let alpha = GRADIENT_TOP_ALPHA + (GRADIENT_BOTTOM_ALPHA - GRADIENT_TOP_ALPHA) * t;
        let py = y as u32 + row;
        for col in 0..w {
            let px = canvas.get_pixel_mut(x as u32 + col, py);
            for c in 0..3 {
                let blended = px.0[c] as f32 * (1.0 - alpha) + color.0[c] as f32 * alpha;
                px.0[c] = blended.round() as u8;
            }
        }
    }
}

/// Draw the label banner above the box (inside it when there is no room).
/// Returns the banner's top edge.
fn draw_banner(
    canvas: &mut RgbImage,
    face: &RecognizedFace,
    style: &OverlayStyle,
    (x, y, w): (i32, i32, u32),
    color: Rgb<u8>,
) -> i32 {
    let text = label_text(face);
    let scale = PxScale::from(style.text_scale);
    let (text_w, text_h) = match &style.font {
        Some(font) => text_size(scale, font, &text),
        None => (0, 0),
    };

    let banner_h = if style.font.is_some() {
        text_h + 4 + CONFIDENCE_BAR_HEIGHT
    } else {
        BANNER_HEIGHT_NO_FONT
    };
    let banner_w = w.max(text_w + 6);
    let banner_y = if y >= banner_h as i32 { y - banner_h as i32 } else { y };

    draw_filled_rect_mut(canvas, Rect::at(x, banner_y).of_size(banner_w, banner_h), color);

    let bar_w = ((banner_w as f32) * face.score().clamp(0.0, 1.0)).round() as u32;
    if bar_w > 0 {
        let bar_y = banner_y + (banner_h - CONFIDENCE_BAR_HEIGHT) as i32;
        draw_filled_rect_mut(
            canvas,
            Rect::at(x, bar_y).of_size(bar_w, CONFIDENCE_BAR_HEIGHT),
            TEXT_COLOR,
        );
    }

    if let Some(font) = &style.font {
        draw_text_mut(canvas, TEXT_COLOR, x + 3, banner_y + 2, scale, font, &text);
    }

    banner_y
}

/// Diamond marker centered on (cx, cy).
fn draw_marker(canvas: &mut RgbImage, cx: i32, cy: i32) {
    let r = MARKER_RADIUS;
    let diamond = [
        Point::new(cx, cy - r),
        Point::new(cx + r, cy),
        Point::new(cx, cy + r),
        Point::new(cx - r, cy),
    ];
    draw_polygon_mut(canvas, &diamond, MARKER_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    const W: u32 = 160;
    const H: u32 = 120;

    fn frame() -> Vec<u8> {
        vec![100u8; (W * H) as usize]
    }

    fn face(id: &str, category: Category, x: f32, y: f32, w: f32, h: f32) -> RecognizedFace {
        RecognizedFace {
            id: id.into(),
            name: id.into(),
            category,
            bounding_box: BoundingBox { x, y, width: w, height: h, confidence: 0.8, landmarks: None },
            confidence: 0.8,
            similarity: None,
            distance: None,
        }
    }

    #[test]
    fn test_no_faces_is_plain_frame() {
        let img = render(&frame(), W, H, &[], &OverlayStyle::default());
        assert_eq!(img.dimensions(), (W, H));
        assert!(img.pixels().all(|p| p.0 == [100, 100, 100]));
    }

    #[test]
    fn test_outline_uses_category_color() {
        let faces = [face("ada", Category::User, 40.0, 40.0, 50.0, 50.0)];
        let img = render(&frame(), W, H, &faces, &OverlayStyle::default());
        assert_eq!(*img.get_pixel(40, 60), USER_COLOR);
        assert_eq!(*img.get_pixel(89, 60), USER_COLOR);

        let unknown = [face("unknown", Category::Unknown, 40.0, 40.0, 50.0, 50.0)];
        let img = render(&frame(), W, H, &unknown, &OverlayStyle::default());
        assert_eq!(*img.get_pixel(40, 60), UNKNOWN_COLOR);
    }

    #[test]
    fn test_gradient_strengthens_downward() {
        let faces = [face("ada", Category::User, 40.0, 40.0, 50.0, 50.0)];
        let img = render(&frame(), W, H, &faces, &OverlayStyle::default());
        // Green channel grows toward the bottom of the box (background is 100).
        let top = img.get_pixel(60, 43).0[1];
        let bottom = img.get_pixel(60, 86).0[1];
        assert!(top > 100);
        assert!(bottom > top, "top={top} bottom={bottom}");
    }

    #[test]
    fn test_banner_above_box_with_confidence_bar() {
        let faces = [face("ada", Category::User, 40.0, 40.0, 50.0, 50.0)];
        let img = render(&frame(), W, H, &faces, &OverlayStyle::default());
        // Banner occupies y in [32, 40); bar is its bottom 3 rows, 80% of the width.
        assert_eq!(*img.get_pixel(45, 33), USER_COLOR);
        assert_eq!(*img.get_pixel(45, 38), TEXT_COLOR);
        assert_eq!(*img.get_pixel(85, 38), USER_COLOR);
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        let faces = [face("ada", Category::User, 500.0, 500.0, 50.0, 50.0)];
        let img = render(&frame(), W, H, &faces, &OverlayStyle::default());
        assert!(img.pixels().all(|p| p.0 == [100, 100, 100]));
    }

    #[test]
    fn test_box_is_clamped_to_frame() {
        let faces = [face("ada", Category::Celebrity, -20.0, 100.0, 60.0, 60.0)];
        let img = render(&frame(), W, H, &faces, &OverlayStyle::default());
        assert_eq!(*img.get_pixel(0, 110), CELEBRITY_COLOR);
    }

    #[test]
    fn test_distinguished_marker() {
        let faces = [face("grace", Category::Celebrity, 40.0, 60.0, 50.0, 50.0)];
        let plain = render(&frame(), W, H, &faces, &OverlayStyle::default());
        let style = OverlayStyle::new(None, Some("grace".into()));
        let marked = render(&frame(), W, H, &faces, &style);

        // Banner top is 52; the marker is centered 8px above it.
        assert_eq!(*marked.get_pixel(65, 44), MARKER_COLOR);
        assert_ne!(*plain.get_pixel(65, 44), MARKER_COLOR);
    }

    #[test]
    fn test_short_frame_renders_blank_canvas() {
        let img = render(&[1, 2, 3], W, H, &[], &OverlayStyle::default());
        assert_eq!(img.dimensions(), (W, H));
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_label_text() {
        let mut f = face("ada", Category::User, 0.0, 0.0, 1.0, 1.0);
        f.name = "Ada Lovelace".into();
        f.similarity = Some(0.874);
        assert_eq!(label_text(&f), "Ada Lovelace 87%");
    }
}
