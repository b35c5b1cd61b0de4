//! Listening history, activity feed and personal data export

use crate::db::repositories::{HistoryRepository, LanguagePreferenceRepository, SongRepository};
use crate::models::{ActivityPage, Emotion, HistoryEntry, Language, PageRequest, User};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Song not found")]
    SongNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Everything stored about a user, as offered for download
#[derive(Debug, Serialize)]
pub struct UserDataExport {
    pub profile: User,
    pub language_preferences: Vec<Language>,
    pub history: Vec<HistoryEntry>,
    pub exported_at: DateTime<Utc>,
}

pub struct HistoryService {
    history: Arc<dyn HistoryRepository>,
    songs: Arc<dyn SongRepository>,
    preferences: Arc<dyn LanguagePreferenceRepository>,
}

impl HistoryService {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        songs: Arc<dyn SongRepository>,
        preferences: Arc<dyn LanguagePreferenceRepository>,
    ) -> Self {
        Self {
            history,
            songs,
            preferences,
        }
    }

    /// Record a detection with no song attached
    pub async fn record_detection(
        &self,
        user_id: i64,
        emotion: Emotion,
    ) -> Result<HistoryEntry, HistoryError> {
        Ok(self
            .history
            .append(user_id, emotion, None)
            .await
            .context("Failed to record detection")?)
    }

    /// Record that the user picked `song_id` while feeling `emotion`
    pub async fn record_selection(
        &self,
        user_id: i64,
        emotion: &str,
        song_id: i64,
    ) -> Result<HistoryEntry, HistoryError> {
        let emotion = Emotion::from_str(emotion)
            .map_err(|_| HistoryError::ValidationError(format!("Unknown emotion: {}", emotion)))?;

        if self
            .songs
            .get_by_id(song_id)
            .await
            .context("Failed to look up song")?
            .is_none()
        {
            return Err(HistoryError::SongNotFound);
        }

        Ok(self
            .history
            .append(user_id, emotion, Some(song_id))
            .await
            .context("Failed to record song selection")?)
    }

    pub async fn activity(&self, user_id: i64, page: PageRequest) -> Result<ActivityPage, HistoryError> {
        Ok(self
            .history
            .list_activity(user_id, page)
            .await
            .context("Failed to load activity")?)
    }

    pub async fn entries(&self, user_id: i64) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self
            .history
            .list_for_user(user_id)
            .await
            .context("Failed to load history")?)
    }

    /// Remove the user's whole history
    pub async fn clear(&self, user_id: i64) -> Result<u64, HistoryError> {
        let removed = self
            .history
            .clear_for_user(user_id)
            .await
            .context("Failed to clear history")?;
        tracing::info!(user_id, removed, "activity history cleared");
        Ok(removed)
    }

    pub async fn count_detections(&self) -> Result<i64, HistoryError> {
        Ok(self
            .history
            .count_detections()
            .await
            .context("Failed to count detections")?)
    }

    /// Bundle profile, preferences and history
    pub async fn export(&self, user: User) -> Result<UserDataExport, HistoryError> {
        let language_preferences = self
            .preferences
            .get(user.id)
            .await
            .context("Failed to load language preferences")?;
        let history = self.entries(user.id).await?;

        Ok(UserDataExport {
            profile: user,
            language_preferences,
            history,
            exported_at: Utc::now(),
        })
    }
}
