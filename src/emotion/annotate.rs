//! Frame annotation for the live stream
//!
//! Boxes and labels are drawn straight onto the RGB buffer with a built-in
//! 5×7 bitmap font, then the frame is JPEG-encoded.

use super::{DetectionError, DetectionOutcome};
use crate::models::Emotion;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

pub const JPEG_QUALITY: u8 = 80;

const BOX_THICKNESS: u32 = 2;
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const TEXT_SCALE: u32 = 2;
const BANNER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

pub fn emotion_color(emotion: Emotion) -> Rgb<u8> {
    match emotion {
        Emotion::Angry => Rgb([255, 0, 0]),
        Emotion::Disgust => Rgb([128, 128, 0]),
        Emotion::Fear => Rgb([128, 0, 128]),
        Emotion::Happy => Rgb([255, 255, 0]),
        Emotion::Neutral => Rgb([128, 128, 128]),
        Emotion::Sad => Rgb([0, 0, 255]),
        Emotion::Surprise => Rgb([255, 165, 0]),
        _ => Rgb([0, 255, 0]),
    }
}

/// Draw every detection and the dominant-emotion banner
pub fn annotate(frame: &mut RgbImage, outcome: &DetectionOutcome) {
    let line_height = (GLYPH_HEIGHT + 3) * TEXT_SCALE;

    for detection in &outcome.detections {
        let color = emotion_color(detection.emotion);
        let x = detection.face.x.max(0.0) as u32;
        let y = detection.face.y.max(0.0) as u32;
        let w = detection.face.width.max(0.0) as u32;
        let h = detection.face.height.max(0.0) as u32;
        draw_rect(frame, x, y, w, h, color);

        let label = format!("{}: {:.2}", detection.emotion, detection.confidence);
        let label_y = if y >= line_height { y - line_height } else { y + h + 2 };
        draw_text(frame, x, label_y, &label, color);
    }

    let banner = format!("Dominant Emotion: {}", outcome.dominant_emotion);
    draw_text(frame, 10, 10, &banner, BANNER_COLOR);
}

pub fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>, DetectionError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(frame)
        .map_err(|e| DetectionError::Inference(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}

fn put(frame: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < frame.width() && y < frame.height() {
        frame.put_pixel(x, y, color);
    }
}

fn draw_rect(frame: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    if w == 0 || h == 0 {
        return;
    }
    for t in 0..BOX_THICKNESS {
        for dx in 0..w {
            put(frame, x + dx, y + t, color);
            put(frame, x + dx, (y + h).saturating_sub(1 + t), color);
        }
        for dy in 0..h {
            put(frame, x + t, y + dy, color);
            put(frame, (x + w).saturating_sub(1 + t), y + dy, color);
        }
    }
}

/// Render `text` upper-cased; unknown characters leave a gap
fn draw_text(frame: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let advance = (GLYPH_WIDTH + 1) * TEXT_SCALE;
    for (i, c) in text.chars().enumerate() {
        let rows = glyph(c.to_ascii_uppercase());
        let origin_x = x + i as u32 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for sy in 0..TEXT_SCALE {
                    for sx in 0..TEXT_SCALE {
                        put(
                            frame,
                            origin_x + col * TEXT_SCALE + sx,
                            y + row as u32 * TEXT_SCALE + sy,
                            color,
                        );
                    }
                }
            }
        }
    }
}

fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0; 7],
    }
}
