//! Seven-way facial expression classifier via ONNX Runtime.
//!
//! The model is an ONNX export of a Keras CNN trained on 48×48 grayscale
//! faces, input `1×48×48×1` in [0, 1], output seven scores in
//! `Emotion::DETECTABLE` order.

use super::lazy::LazyModel;
use super::{DetectionError, EmotionClassifier, EmotionScores, NUM_LABELS};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct OnnxEmotionClassifier {
    model: LazyModel<Mutex<Session>>,
}

impl OnnxEmotionClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            model: LazyModel::new(path, load_session),
        }
    }
}

fn load_session(path: &Path) -> Result<Mutex<Session>, DetectionError> {
    let session = Session::builder()?
        .with_intra_threads(1)?
        .commit_from_file(path)?;
    tracing::debug!(
        inputs = ?session.inputs().iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
        "emotion classifier inputs"
    );
    Ok(Mutex::new(session))
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&self, face: &Array4<f32>) -> Result<EmotionScores, DetectionError> {
        let model = self.model.get()?;
        let mut session = model
            .lock()
            .map_err(|_| DetectionError::Inference("classifier lock poisoned".to_string()))?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(face.view())?])?;
        let (_, raw) = outputs[0].try_extract_tensor::<f32>()?;
        if raw.len() < NUM_LABELS {
            return Err(DetectionError::Inference(format!(
                "classifier returned {} scores, expected {}",
                raw.len(),
                NUM_LABELS
            )));
        }

        let mut scores = [0.0f32; NUM_LABELS];
        scores.copy_from_slice(&raw[..NUM_LABELS]);
        Ok(EmotionScores(to_probabilities(scores)))
    }
}

/// Pass probability vectors through; softmax anything else
fn to_probabilities(scores: [f32; NUM_LABELS]) -> [f32; NUM_LABELS] {
    let sum: f32 = scores.iter().sum();
    let is_distribution = scores.iter().all(|p| (0.0..=1.0).contains(p)) && (sum - 1.0).abs() < 1e-3;
    if is_distribution {
        return scores;
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut out = scores.map(|s| (s - max).exp());
    let total: f32 = out.iter().sum();
    for p in &mut out {
        *p /= total;
    }
    out
}
