//! Emotion detection pipeline
//!
//! image bytes → grayscale → face boxes → 48×48 crops → classifier scores →
//! dominant emotion. The face locator and the classifier are trait objects so
//! the ONNX models can be swapped for stubs.

pub mod annotate;
#[cfg(feature = "camera")]
pub mod camera;
pub mod classifier;
pub mod lazy;
pub mod locator;
pub mod preprocess;

use crate::config::DetectionConfig;
use crate::models::Emotion;
use image::GrayImage;
use ndarray::Array4;
use serde::Serialize;
use std::sync::Arc;

pub use classifier::OnnxEmotionClassifier;
pub use lazy::LazyModel;
pub use locator::OnnxFaceLocator;

/// Number of classifier outputs
pub const NUM_LABELS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Emotion model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Image exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No faces detected")]
    NoFacesDetected,

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl From<ort::Error> for DetectionError {
    fn from(e: ort::Error) -> Self {
        DetectionError::Inference(e.to_string())
    }
}

/// Face bounding box in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Classifier probabilities indexed like `Emotion::DETECTABLE`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionScores(pub [f32; NUM_LABELS]);

impl EmotionScores {
    /// Highest-scoring label and its probability. Ties keep the lower index.
    pub fn top(&self) -> (Emotion, f32) {
        let mut best = 0;
        for (i, p) in self.0.iter().enumerate() {
            if *p > self.0[best] {
                best = i;
            }
        }
        (Emotion::DETECTABLE[best], self.0[best])
    }
}

/// Finds faces in a grayscale frame
pub trait FaceLocator: Send + Sync {
    fn locate(&self, frame: &GrayImage) -> Result<Vec<FaceBox>, DetectionError>;
}

/// Scores a `(1, 48, 48, 1)` face tensor scaled to [0, 1]
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, face: &Array4<f32>) -> Result<EmotionScores, DetectionError>;
}

/// One classified face
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub emotion: Emotion,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub face: FaceBox,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub dominant_emotion: Emotion,
    pub detections: Vec<Detection>,
}

/// The single most confident detection; earlier faces win ties.
pub fn dominant(detections: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for d in detections {
        match best {
            Some(b) if d.confidence <= b.confidence => {}
            _ => best = Some(d),
        }
    }
    best
}

pub struct EmotionPipeline {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    max_image_bytes: usize,
}

impl EmotionPipeline {
    pub fn new(
        locator: Arc<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            locator,
            classifier,
            max_image_bytes,
        }
    }

    /// Pipeline over the ONNX models named in the config. Nothing is loaded
    /// until the first detection.
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            Arc::new(OnnxFaceLocator::new(&config.face_model, config.face_confidence)),
            Arc::new(OnnxEmotionClassifier::new(&config.classifier_model)),
            config.max_image_bytes,
        )
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// Classify every face in a grayscale frame
    pub fn analyze(&self, frame: &GrayImage) -> Result<DetectionOutcome, DetectionError> {
        let faces = self.locator.locate(frame)?;

        let mut detections = Vec::with_capacity(faces.len());
        for face in faces {
            let Some(tensor) = preprocess::face_tensor(frame, &face) else {
                continue;
            };
            let (emotion, confidence) = self.classifier.classify(&tensor)?.top();
            detections.push(Detection {
                emotion,
                confidence,
                face,
            });
        }

        let dominant_emotion = dominant(&detections)
            .map(|d| d.emotion)
            .ok_or(DetectionError::NoFacesDetected)?;
        Ok(DetectionOutcome {
            dominant_emotion,
            detections,
        })
    }

    /// Run the pipeline over a base64 string or data URL
    pub fn analyze_payload(&self, payload: &str) -> Result<DetectionOutcome, DetectionError> {
        let bytes = preprocess::decode_payload(payload, self.max_image_bytes)?;
        let frame = preprocess::decode_grayscale(&bytes, self.max_image_bytes)?;
        self.analyze(&frame)
    }

    /// `analyze_payload` on the blocking pool
    pub async fn detect(self: &Arc<Self>, payload: String) -> Result<DetectionOutcome, DetectionError> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.analyze_payload(&payload))
            .await
            .map_err(|e| DetectionError::Inference(format!("detection task failed: {}", e)))?
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub models for pipeline and handler tests

    use super::*;

    /// Returns fixed boxes regardless of the frame
    pub struct FixedLocator(pub Vec<FaceBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _frame: &GrayImage) -> Result<Vec<FaceBox>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    /// Returns one score vector per call, cycling through the list
    pub struct ScriptedClassifier {
        scores: Vec<EmotionScores>,
        next: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedClassifier {
        pub fn new(scores: Vec<[f32; NUM_LABELS]>) -> Self {
            Self {
                scores: scores.into_iter().map(EmotionScores).collect(),
                next: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    impl EmotionClassifier for ScriptedClassifier {
        fn classify(&self, _face: &Array4<f32>) -> Result<EmotionScores, DetectionError> {
            let i = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.scores[i % self.scores.len()])
        }
    }

    pub struct MissingModel;

    impl FaceLocator for MissingModel {
        fn locate(&self, _frame: &GrayImage) -> Result<Vec<FaceBox>, DetectionError> {
            Err(DetectionError::ModelUnavailable("models/face_detector.onnx".to_string()))
        }
    }

    pub fn face_at(x: f32, y: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: 40.0,
            height: 40.0,
            confidence: 0.99,
        }
    }

    /// Scores with `p` on `label` and the rest spread evenly
    pub fn scores_for(label: Emotion, p: f32) -> [f32; NUM_LABELS] {
        let idx = Emotion::DETECTABLE
            .iter()
            .position(|e| *e == label)
            .expect("detectable label");
        let rest = (1.0 - p) / (NUM_LABELS - 1) as f32;
        let mut scores = [rest; NUM_LABELS];
        scores[idx] = p;
        scores
    }

    pub fn stub_pipeline(faces: Vec<FaceBox>, scores: Vec<[f32; NUM_LABELS]>) -> EmotionPipeline {
        EmotionPipeline::new(
            Arc::new(FixedLocator(faces)),
            Arc::new(ScriptedClassifier::new(scores)),
            5 * 1024 * 1024,
        )
    }

    /// A PNG data URL of a flat grey square
    pub fn png_data_url(size: u32) -> String {
        let mut png = Vec::new();
        image::DynamicImage::new_luma8(size, size)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            data_encoding::BASE64.encode(&png)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_single_happy_face() {
        let pipeline = Arc::new(stub_pipeline(
            vec![face_at(10.0, 10.0)],
            vec![scores_for(Emotion::Happy, 0.82)],
        ));
        let outcome = pipeline.detect(png_data_url(100)).await.unwrap();
        assert_eq!(outcome.dominant_emotion, Emotion::Happy);
        assert_eq!(outcome.detections.len(), 1);
        assert!((outcome.detections[0].confidence - 0.82).abs() < 1e-6);
    }

    #[test]
    fn test_no_faces() {
        let pipeline = stub_pipeline(vec![], vec![scores_for(Emotion::Sad, 0.9)]);
        let result = pipeline.analyze_payload(&png_data_url(32));
        assert!(matches!(result, Err(DetectionError::NoFacesDetected)));
    }

    #[test]
    fn test_faces_outside_frame_are_skipped() {
        let pipeline = stub_pipeline(
            vec![face_at(500.0, 500.0)],
            vec![scores_for(Emotion::Sad, 0.9)],
        );
        let result = pipeline.analyze_payload(&png_data_url(32));
        assert!(matches!(result, Err(DetectionError::NoFacesDetected)));
    }

    #[test]
    fn test_most_confident_face_wins_over_majority() {
        let pipeline = stub_pipeline(
            vec![face_at(0.0, 0.0), face_at(40.0, 0.0), face_at(0.0, 40.0)],
            vec![
                scores_for(Emotion::Sad, 0.6),
                scores_for(Emotion::Sad, 0.6),
                scores_for(Emotion::Surprise, 0.9),
            ],
        );
        let outcome = pipeline.analyze_payload(&png_data_url(100)).unwrap();
        assert_eq!(outcome.dominant_emotion, Emotion::Surprise);
    }

    #[test]
    fn test_model_unavailable_propagates() {
        let pipeline = EmotionPipeline::new(
            Arc::new(MissingModel),
            Arc::new(ScriptedClassifier::new(vec![scores_for(Emotion::Happy, 1.0)])),
            1024 * 1024,
        );
        let result = pipeline.analyze_payload(&png_data_url(16));
        assert!(matches!(result, Err(DetectionError::ModelUnavailable(_))));
    }

    #[test]
    fn test_ties_keep_first() {
        let scores = EmotionScores([0.4, 0.0, 0.0, 0.4, 0.2, 0.0, 0.0]);
        assert_eq!(scores.top(), (Emotion::Angry, 0.4));

        let a = Detection { emotion: Emotion::Fear, confidence: 0.5, face: face_at(0.0, 0.0) };
        let b = Detection { emotion: Emotion::Happy, confidence: 0.5, face: face_at(1.0, 0.0) };
        assert_eq!(dominant(&[a, b]).unwrap().emotion, Emotion::Fear);
        assert!(dominant(&[]).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// The dominant emotion is the label of the single most confident face.
        #[test]
        fn dominant_is_max_probability(
            picks in proptest::collection::vec((0usize..NUM_LABELS, 0.15f32..1.0), 1..6)
        ) {
            let faces: Vec<_> = (0..picks.len()).map(|i| face_at(i as f32 * 10.0, 0.0)).collect();
            let scores: Vec<_> = picks
                .iter()
                .map(|(label, p)| scores_for(Emotion::DETECTABLE[*label], *p))
                .collect();
            let pipeline = stub_pipeline(faces, scores.clone());
            let outcome = pipeline.analyze_payload(&png_data_url(64)).unwrap();

            let best = outcome
                .detections
                .iter()
                .map(|d| d.confidence)
                .fold(f32::MIN, f32::max);
            let first_best = outcome.detections.iter().find(|d| d.confidence == best).unwrap();
            prop_assert_eq!(outcome.dominant_emotion, first_best.emotion);
            prop_assert_eq!(outcome.detections.len(), picks.len());
        }
    }
}
