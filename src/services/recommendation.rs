//! Recommendation filter
//!
//! Songs tagged with the requested mood, narrowed to the listener's
//! preferred languages when they have chosen any.

use crate::db::repositories::{LanguagePreferenceRepository, SongRepository};
use crate::models::{Emotion, Song};
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct RecommendationService {
    songs: Arc<dyn SongRepository>,
    preferences: Arc<dyn LanguagePreferenceRepository>,
}

impl RecommendationService {
    pub fn new(
        songs: Arc<dyn SongRepository>,
        preferences: Arc<dyn LanguagePreferenceRepository>,
    ) -> Self {
        Self { songs, preferences }
    }

    /// Songs for `emotion` in storage order
    pub async fn recommend(&self, emotion: Emotion, user_id: Option<i64>) -> Result<Vec<Song>> {
        let languages = match user_id {
            Some(id) => self
                .preferences
                .get(id)
                .await
                .context("Failed to load language preferences")?,
            None => Vec::new(),
        };

        self.songs
            .list_by_emotion(emotion, &languages)
            .await
            .context("Failed to load recommendations")
    }
}
