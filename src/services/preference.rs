//! Language preference service

use crate::db::repositories::LanguagePreferenceRepository;
use crate::models::Language;
use anyhow::Context;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PreferenceService {
    repo: Arc<dyn LanguagePreferenceRepository>,
}

impl PreferenceService {
    pub fn new(repo: Arc<dyn LanguagePreferenceRepository>) -> Self {
        Self { repo }
    }

    pub async fn get(&self, user_id: i64) -> Result<Vec<Language>, PreferenceError> {
        Ok(self
            .repo
            .get(user_id)
            .await
            .context("Failed to load language preferences")?)
    }

    /// Replace preferences from raw labels. Any unknown label rejects the
    /// whole request; an empty list clears the filter.
    pub async fn save<S: AsRef<str>>(
        &self,
        user_id: i64,
        labels: &[S],
    ) -> Result<Vec<Language>, PreferenceError> {
        let mut languages = labels
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Language::from_str(raw).map_err(|_| {
                    PreferenceError::ValidationError(format!("Unknown language: {}", raw))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        languages.sort();
        languages.dedup();

        self.repo
            .replace(user_id, &languages)
            .await
            .context("Failed to save language preferences")?;
        tracing::debug!(user_id, count = languages.len(), "language preferences saved");
        Ok(languages)
    }
}
