//! Language preference repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Language;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait LanguagePreferenceRepository: Send + Sync {
    /// A user's preferred languages in canonical order
    async fn get(&self, user_id: i64) -> Result<Vec<Language>>;

    /// Atomically replace a user's preferences
    async fn replace(&self, user_id: i64, languages: &[Language]) -> Result<()>;
}

pub struct SqlxLanguagePreferenceRepository {
    pool: DynDatabasePool,
}

impl SqlxLanguagePreferenceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LanguagePreferenceRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LanguagePreferenceRepository for SqlxLanguagePreferenceRepository {
    async fn get(&self, user_id: i64) -> Result<Vec<Language>> {
        let raw = match self.pool.driver() {
            DatabaseDriver::Sqlite => get_sqlite(self.pool.as_sqlite().unwrap(), user_id).await?,
            DatabaseDriver::Mysql => get_mysql(self.pool.as_mysql().unwrap(), user_id).await?,
        };

        let mut languages = raw
            .iter()
            .map(|s| Language::from_str(s))
            .collect::<Result<Vec<_>>>()?;
        languages.sort();
        Ok(languages)
    }

    async fn replace(&self, user_id: i64, languages: &[Language]) -> Result<()> {
        let mut unique = languages.to_vec();
        unique.sort();
        unique.dedup();

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                replace_sqlite(self.pool.as_sqlite().unwrap(), user_id, &unique).await
            }
            DatabaseDriver::Mysql => {
                replace_mysql(self.pool.as_mysql().unwrap(), user_id, &unique).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT language FROM user_language_preferences WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to load language preferences")?;
    Ok(rows.iter().map(|row| row.get("language")).collect())
}

async fn replace_sqlite(pool: &SqlitePool, user_id: i64, languages: &[Language]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM user_language_preferences WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear language preferences")?;

    for language in languages {
        sqlx::query("INSERT INTO user_language_preferences (user_id, language) VALUES (?, ?)")
            .bind(user_id)
            .bind(language.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to save language preference")?;
    }

    tx.commit().await.context("Failed to commit language preferences")?;
    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT language FROM user_language_preferences WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to load language preferences")?;
    Ok(rows.iter().map(|row| row.get("language")).collect())
}

async fn replace_mysql(pool: &MySqlPool, user_id: i64, languages: &[Language]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM user_language_preferences WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear language preferences")?;

    for language in languages {
        sqlx::query("INSERT INTO user_language_preferences (user_id, language) VALUES (?, ?)")
            .bind(user_id)
            .bind(language.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to save language preference")?;
    }

    tx.commit().await.context("Failed to commit language preferences")?;
    Ok(())
}
