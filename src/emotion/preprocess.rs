//! Payload decoding and face crop preparation

use super::{DetectionError, FaceBox};
use data_encoding::BASE64_NOPAD;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;

/// Side of the square classifier input
pub const FACE_SIZE: u32 = 48;

/// Decode a base64 payload, with or without a `data:image/...;base64,`
/// prefix. The decoded size is checked before any decoding work.
pub fn decode_payload(payload: &str, max_bytes: usize) -> Result<Vec<u8>, DetectionError> {
    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| DetectionError::InvalidImage("malformed data URL".to_string()))?,
        None => payload,
    };

    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let compact = compact.trim_end_matches('=');

    if compact.len() / 4 * 3 + (compact.len() % 4) * 3 / 4 > max_bytes {
        return Err(DetectionError::PayloadTooLarge { limit: max_bytes });
    }
    if compact.is_empty() {
        return Err(DetectionError::InvalidImage("no image data provided".to_string()));
    }

    BASE64_NOPAD
        .decode(compact.as_bytes())
        .map_err(|e| DetectionError::InvalidImage(format!("bad base64: {}", e)))
}

/// Decode image bytes into an 8-bit grayscale frame
pub fn decode_grayscale(bytes: &[u8], max_bytes: usize) -> Result<GrayImage, DetectionError> {
    if bytes.len() > max_bytes {
        return Err(DetectionError::PayloadTooLarge { limit: max_bytes });
    }
    let image = image::load_from_memory(bytes)
        .map_err(|e| DetectionError::InvalidImage(e.to_string()))?;
    Ok(image.to_luma8())
}

/// Crop `face` (clamped to the frame), resize to 48×48 and scale to [0, 1]
/// as a `(1, 48, 48, 1)` tensor. None if the box misses the frame.
pub fn face_tensor(frame: &GrayImage, face: &FaceBox) -> Option<Array4<f32>> {
    let (width, height) = frame.dimensions();
    let x0 = face.x.max(0.0).floor() as u32;
    let y0 = face.y.max(0.0).floor() as u32;
    let x1 = ((face.x + face.width).ceil().max(0.0) as u32).min(width);
    let y1 = ((face.y + face.height).ceil().max(0.0) as u32).min(height);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let crop = imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image();
    let resized = imageops::resize(&crop, FACE_SIZE, FACE_SIZE, FilterType::Triangle);

    let size = FACE_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 1));
    for (x, y, pixel) in resized.enumerate_pixels() {
        tensor[[0, y as usize, x as usize, 0]] = pixel.0[0] as f32 / 255.0;
    }
    Some(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::BASE64;
    use image::Luma;

    fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_decode_plain_and_data_url() {
        let encoded = BASE64.encode(b"hello image");
        assert_eq!(decode_payload(&encoded, 1024).unwrap(), b"hello image");

        let url = format!("data:image/jpeg;base64,{}", encoded);
        assert_eq!(decode_payload(&url, 1024).unwrap(), b"hello image");
    }

    #[test]
    fn test_size_checked_before_decode() {
        // Not valid base64, but too long to matter
        let huge = "!".repeat(4000);
        assert!(matches!(
            decode_payload(&huge, 1000),
            Err(DetectionError::PayloadTooLarge { limit: 1000 })
        ));

        let exact = BASE64.encode(&[7u8; 1000]);
        assert!(decode_payload(&exact, 1000).is_ok());
        let over = BASE64.encode(&[7u8; 1001]);
        assert!(matches!(
            decode_payload(&over, 1000),
            Err(DetectionError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(matches!(decode_payload("", 10), Err(DetectionError::InvalidImage(_))));
        assert!(matches!(decode_payload("data:image/png", 10), Err(DetectionError::InvalidImage(_))));
        assert!(matches!(decode_payload("@@@@", 10), Err(DetectionError::InvalidImage(_))));
        assert!(matches!(
            decode_grayscale(b"not an image", 100),
            Err(DetectionError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_grayscale(&[0u8; 101], 100),
            Err(DetectionError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_face_tensor_shape_and_scale() {
        let frame = GrayImage::from_pixel(100, 80, Luma([255]));
        let tensor = face_tensor(&frame, &face(10.0, 10.0, 30.0, 30.0)).unwrap();
        assert_eq!(tensor.shape(), &[1, 48, 48, 1]);
        assert!(tensor.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_face_tensor_clamps_to_frame() {
        let frame = GrayImage::from_pixel(50, 50, Luma([0]));
        assert!(face_tensor(&frame, &face(-20.0, -20.0, 40.0, 40.0)).is_some());
        assert!(face_tensor(&frame, &face(40.0, 40.0, 100.0, 100.0)).is_some());
        assert!(face_tensor(&frame, &face(60.0, 0.0, 10.0, 10.0)).is_none());
        assert!(face_tensor(&frame, &face(-30.0, 0.0, 10.0, 10.0)).is_none());
    }
}
