//! Detection service
//!
//! Runs the emotion pipeline for a signed-in user, records the result in
//! their history and looks up matching songs.

use crate::db::repositories::HistoryRepository;
use crate::emotion::{Detection, DetectionError, EmotionPipeline};
use crate::models::Emotion;
use crate::services::recommendation::RecommendationService;
use crate::services::song::SongView;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DetectionServiceError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub dominant_emotion: Emotion,
    pub detections: Vec<Detection>,
    pub recommendations: Vec<SongView>,
}

pub struct DetectionService {
    pipeline: Arc<EmotionPipeline>,
    history: Arc<dyn HistoryRepository>,
    recommendations: Arc<RecommendationService>,
}

impl DetectionService {
    pub fn new(
        pipeline: Arc<EmotionPipeline>,
        history: Arc<dyn HistoryRepository>,
        recommendations: Arc<RecommendationService>,
    ) -> Self {
        Self {
            pipeline,
            history,
            recommendations,
        }
    }

    pub fn pipeline(&self) -> &Arc<EmotionPipeline> {
        &self.pipeline
    }

    /// Detect the dominant emotion in `payload` and recommend songs for it.
    ///
    /// A failed history write is logged and does not fail the request.
    pub async fn process(
        &self,
        user_id: i64,
        payload: String,
    ) -> Result<DetectionReport, DetectionServiceError> {
        let outcome = self.pipeline.detect(payload).await?;
        let emotion = outcome.dominant_emotion;
        tracing::debug!(user_id, %emotion, faces = outcome.detections.len(), "emotion detected");

        if let Err(e) = self.history.append(user_id, emotion, None).await {
            tracing::warn!(user_id, %emotion, error = %e, "failed to record detection history");
        }

        let songs = self.recommendations.recommend(emotion, Some(user_id)).await?;
        Ok(DetectionReport {
            dominant_emotion: emotion,
            detections: outcome.detections,
            recommendations: songs.into_iter().map(SongView::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::testing::{insert_user, setup_pool};
    use crate::db::repositories::{
        SongRepository, SqlxHistoryRepository, SqlxLanguagePreferenceRepository, SqlxSongRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::emotion::testing::{face_at, png_data_url, scores_for, stub_pipeline};
    use crate::models::{CreateSongInput, Language};

    fn service(pool: &DynDatabasePool, pipeline: EmotionPipeline) -> DetectionService {
        let recommendations = Arc::new(RecommendationService::new(
            SqlxSongRepository::boxed(pool.clone()),
            SqlxLanguagePreferenceRepository::boxed(pool.clone()),
        ));
        DetectionService::new(
            Arc::new(pipeline),
            SqlxHistoryRepository::boxed(pool.clone()),
            recommendations,
        )
    }

    async fn seed(pool: &DynDatabasePool) {
        let songs = SqlxSongRepository::new(pool.clone());
        for (title, emotion) in [("Joy", Emotion::Happy), ("Blue", Emotion::Sad), ("Glee", Emotion::Happy)] {
            songs
                .create(&CreateSongInput {
                    title: title.to_string(),
                    artist: "A".to_string(),
                    url: "https://youtu.be/abc".to_string(),
                    emotion,
                    language: Language::English,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_happy_face_recommends_happy_songs_and_records_history() {
        let pool = setup_pool().await;
        seed(&pool).await;
        let user = insert_user(&pool, "smiler").await;
        let service = service(
            &pool,
            stub_pipeline(vec![face_at(5.0, 5.0)], vec![scores_for(Emotion::Happy, 0.82)]),
        );

        let report = service.process(user, png_data_url(64)).await.unwrap();
        assert_eq!(report.dominant_emotion, Emotion::Happy);
        let titles: Vec<_> = report.recommendations.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Joy", "Glee"]);
        assert!(report.recommendations.iter().all(|s| s.emotion == Emotion::Happy));

        let history = SqlxHistoryRepository::new(pool.clone());
        let entries = history.list_for_user(user).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].emotion, Emotion::Happy);
        assert_eq!(entries[0].song_id, None);
    }

    #[tokio::test]
    async fn test_no_faces_writes_no_history() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "nobody").await;
        let service = service(&pool, stub_pipeline(vec![], vec![scores_for(Emotion::Sad, 0.9)]));

        let result = service.process(user, png_data_url(32)).await;
        assert!(matches!(
            result,
            Err(DetectionServiceError::Detection(DetectionError::NoFacesDetected))
        ));
        let history = SqlxHistoryRepository::new(pool.clone());
        assert!(history.list_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_failure_is_not_surfaced() {
        let pool = setup_pool().await;
        seed(&pool).await;
        let service = service(
            &pool,
            stub_pipeline(vec![face_at(0.0, 0.0)], vec![scores_for(Emotion::Sad, 0.7)]),
        );

        // No such user: the history insert violates its foreign key
        let report = service.process(9999, png_data_url(32)).await.unwrap();
        assert_eq!(report.dominant_emotion, Emotion::Sad);
        assert_eq!(report.recommendations.len(), 1);
    }
}
