//! UltraFace face detector via ONNX Runtime.
//!
//! Expects the RFB-320 export: a `1×3×240×320` input and two outputs,
//! `scores` (`1×N×2`, background/face) and `boxes` (`1×N×4`, corner
//! coordinates normalised to [0, 1]).

use super::lazy::LazyModel;
use super::{DetectionError, FaceBox, FaceLocator};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;
const INPUT_MEAN: f32 = 127.0;
const INPUT_STD: f32 = 128.0;
const NMS_IOU_THRESHOLD: f32 = 0.3;

/// Loaded session plus the positions of its two outputs
struct UltraFace {
    session: Session,
    scores_idx: usize,
    boxes_idx: usize,
}

pub struct OnnxFaceLocator {
    model: LazyModel<Mutex<UltraFace>>,
    confidence: f32,
}

impl OnnxFaceLocator {
    pub fn new(path: impl Into<PathBuf>, confidence: f32) -> Self {
        Self {
            model: LazyModel::new(path, load_ultraface),
            confidence,
        }
    }
}

fn load_ultraface(path: &Path) -> Result<Mutex<UltraFace>, DetectionError> {
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(path)?;

    let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
    if names.len() < 2 {
        return Err(DetectionError::ModelUnavailable(format!(
            "face detector needs 2 outputs, got {}",
            names.len()
        )));
    }
    let scores_idx = names.iter().position(|n| n == "scores").unwrap_or(0);
    let boxes_idx = names.iter().position(|n| n == "boxes").unwrap_or(1);
    tracing::debug!(?names, scores_idx, boxes_idx, "face detector outputs");

    Ok(Mutex::new(UltraFace {
        session,
        scores_idx,
        boxes_idx,
    }))
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&self, frame: &GrayImage) -> Result<Vec<FaceBox>, DetectionError> {
        let model = self.model.get()?;
        let input = preprocess(frame);

        let mut guard = model
            .lock()
            .map_err(|_| DetectionError::Inference("face detector lock poisoned".to_string()))?;
        let UltraFace {
            session,
            scores_idx,
            boxes_idx,
        } = &mut *guard;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, scores) = outputs[*scores_idx].try_extract_tensor::<f32>()?;
        let (_, boxes) = outputs[*boxes_idx].try_extract_tensor::<f32>()?;

        let (width, height) = frame.dimensions();
        let candidates = decode(scores, boxes, width as f32, height as f32, self.confidence);
        Ok(nms(candidates, NMS_IOU_THRESHOLD))
    }
}

/// Grayscale frame → normalised NCHW tensor with the channel replicated
fn preprocess(frame: &GrayImage) -> Array4<f32> {
    let resized = imageops::resize(frame, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let v = (pixel.0[0] as f32 - INPUT_MEAN) / INPUT_STD;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }
    tensor
}

/// Candidates above `threshold`, scaled back to frame pixels
fn decode(scores: &[f32], boxes: &[f32], width: f32, height: f32, threshold: f32) -> Vec<FaceBox> {
    let anchors = (scores.len() / 2).min(boxes.len() / 4);
    let mut faces = Vec::new();
    for i in 0..anchors {
        let score = scores[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        let x1 = boxes[i * 4].clamp(0.0, 1.0) * width;
        let y1 = boxes[i * 4 + 1].clamp(0.0, 1.0) * height;
        let x2 = boxes[i * 4 + 2].clamp(0.0, 1.0) * width;
        let y2 = boxes[i * 4 + 3].clamp(0.0, 1.0) * height;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        faces.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }
    faces
}

/// Non-maximum suppression; survivors ordered by confidence
fn nms(mut faces: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    faces.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for face in faces {
        if keep.iter().all(|k| iou(k, &face) <= iou_threshold) {
            keep.push(face);
        }
    }
    keep
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fb(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence,
        }
    }

    #[test]
    fn test_iou() {
        let a = fb(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &fb(20.0, 20.0, 10.0, 10.0, 1.0)), 0.0);
        let half = fb(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_drops_overlaps_and_orders_by_confidence() {
        let faces = vec![
            fb(200.0, 200.0, 50.0, 50.0, 0.75),
            fb(0.0, 0.0, 100.0, 100.0, 0.9),
            fb(5.0, 5.0, 100.0, 100.0, 0.8),
        ];
        let kept = nms(faces, NMS_IOU_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.75);
    }

    #[test]
    fn test_decode_scales_and_thresholds() {
        let scores = [0.9, 0.1, 0.2, 0.8, 0.25, 0.75];
        let boxes = [
            0.0, 0.0, 1.0, 1.0, // below threshold
            0.25, 0.5, 0.5, 1.0, // kept
            0.5, 0.5, 0.4, 0.9, // inverted, dropped
        ];
        let faces = decode(&scores, &boxes, 200.0, 100.0, 0.7);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0], fb(50.0, 50.0, 50.0, 50.0, 0.8));
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let frame = GrayImage::from_pixel(64, 48, Luma([255]));
        let tensor = preprocess(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 240, 320]);
        let expected = (255.0 - INPUT_MEAN) / INPUT_STD;
        assert!(tensor.iter().all(|v| (*v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let locator = OnnxFaceLocator::new("/nonexistent/face.onnx", 0.7);
        let frame = GrayImage::new(10, 10);
        assert!(matches!(locator.locate(&frame), Err(DetectionError::ModelUnavailable(_))));
    }
}
