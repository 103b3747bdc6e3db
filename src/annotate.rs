//! Drawing detections onto frames
//!
//! Boxes and labels are rasterised directly into the RGB buffer with a small
//! built-in 5x7 bitmap font, so no font files are needed at runtime.

use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::detection::Detection;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("cannot annotate empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
}

/// Annotation capability
pub trait Annotator: Send {
    fn annotate(&mut self, image: RgbImage, detections: &[Detection])
        -> Result<RgbImage, AnnotateError>;
}

impl<A: Annotator + ?Sized> Annotator for Box<A> {
    fn annotate(
        &mut self,
        image: RgbImage,
        detections: &[Detection],
    ) -> Result<RgbImage, AnnotateError> {
        (**self).annotate(image, detections)
    }
}

const MARGIN: i32 = 10;
const ROW_SIZE: i32 = 10;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

/// Red boxes with `label (score)` text at the top-left corner
#[derive(Debug, Clone)]
pub struct BoxAnnotator {
    pub color: Rgb<u8>,
    pub thickness: i32,
    pub text_scale: i32,
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self {
            color: Rgb([255, 0, 0]),
            thickness: 3,
            text_scale: 2,
        }
    }
}

impl Annotator for BoxAnnotator {
    fn annotate(
        &mut self,
        mut image: RgbImage,
        detections: &[Detection],
    ) -> Result<RgbImage, AnnotateError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AnnotateError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }

        for detection in detections {
            let bbox = &detection.bounding_box;
            let (right, bottom) = bbox.bottom_right();
            draw_rectangle(
                &mut image,
                bbox.origin_x,
                bbox.origin_y,
                right,
                bottom,
                self.thickness,
                self.color,
            );

            let text = format!("{} ({:.2})", detection.label, detection.score);
            draw_text(
                &mut image,
                MARGIN + bbox.origin_x,
                MARGIN + ROW_SIZE + bbox.origin_y - GLYPH_HEIGHT * self.text_scale,
                &text,
                self.text_scale,
                self.color,
            );
        }

        Ok(image)
    }
}

/// Write `FPS = 12.3` in the top-left corner
pub fn draw_fps_overlay(image: &mut RgbImage, fps: f32) {
    let text = format!("FPS = {:.1}", fps);
    let scale = 2;
    let width = text_width(&text, scale);
    fill_rect(
        image,
        MARGIN - 4,
        MARGIN - 4,
        MARGIN + width + 4,
        MARGIN + GLYPH_HEIGHT * scale + 4,
        Rgb([0, 0, 0]),
    );
    draw_text(image, MARGIN, MARGIN, &text, scale, Rgb([0, 0, 255]));
}

fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * (GLYPH_WIDTH + 1) * scale
}

fn put_pixel(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    for t in 0..thickness.max(1) {
        let (l, tp, r, b) = (left + t, top + t, right - t, bottom - t);
        if l > r || tp > b {
            break;
        }
        for x in l..=r {
            put_pixel(image, x, tp, color);
            put_pixel(image, x, b, color);
        }
        for y in tp..=b {
            put_pixel(image, l, y, color);
            put_pixel(image, r, y, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    for y in top..=bottom {
        for x in left..=right {
            put_pixel(image, x, y, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, scale: i32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let mut pen_x = x;

    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = pen_x + col * scale;
                        let py = y + row as i32 * scale;
                        fill_rect(image, px, py, px + scale - 1, py + scale - 1, color);
                    }
                }
            }
        }
        pen_x += (GLYPH_WIDTH + 1) * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x1E, 0x10, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x1E, 0x10, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x0E, 0x01, 0x01, 0x11, 0x0E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1E, 0x01, 0x01, 0x0E, 0x01, 0x01, 0x1E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '=' => [0x00, 0x00, 0x1F, 0x00, 0x1F, 0x00, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(bits)
}
