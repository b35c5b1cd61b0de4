//! Song repository
//!
//! Catalogue storage and the emotion/language filter behind recommendations.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateSongInput, Emotion, Language, Song};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Song repository trait
#[async_trait]
pub trait SongRepository: Send + Sync {
    async fn create(&self, input: &CreateSongInput) -> Result<Song>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Song>>;

    /// Delete a song. Returns false if it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Songs tagged `emotion`, restricted to `languages` unless that slice is
    /// empty. Storage order.
    async fn list_by_emotion(&self, emotion: Emotion, languages: &[Language]) -> Result<Vec<Song>>;

    /// Whole catalogue, ordered by emotion then title
    async fn list_all(&self) -> Result<Vec<Song>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based song repository implementation
pub struct SqlxSongRepository {
    pool: DynDatabasePool,
}

impl SqlxSongRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SongRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SongRepository for SqlxSongRepository {
    async fn create(&self, input: &CreateSongInput) -> Result<Song> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_song_sqlite(self.pool.as_sqlite().unwrap(), input).await,
            DatabaseDriver::Mysql => create_song_mysql(self.pool.as_mysql().unwrap(), input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Song>> {
        let sql = format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get song by ID")?;
                row.as_ref().map(row_to_song_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get song by ID")?;
                row.as_ref().map(row_to_song_mysql).transpose()
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM songs WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete song")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete song")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_emotion(&self, emotion: Emotion, languages: &[Language]) -> Result<Vec<Song>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_by_emotion_sqlite(self.pool.as_sqlite().unwrap(), emotion, languages).await
            }
            DatabaseDriver::Mysql => {
                list_by_emotion_mysql(self.pool.as_mysql().unwrap(), emotion, languages).await
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<Song>> {
        let sql = format!("SELECT {} FROM songs ORDER BY emotion, title, id", SONG_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list songs")?;
                rows.iter().map(row_to_song_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list songs")?;
                rows.iter().map(row_to_song_mysql).collect()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM songs";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count songs")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count songs")?
                .get("count"),
        };
        Ok(count)
    }
}

const SONG_COLUMNS: &str = "id, title, artist, url, emotion, language, created_at";

/// `SELECT ... WHERE emotion = ? [AND language IN (?, ?, ...)]`
fn filter_sql(language_count: usize) -> String {
    let mut sql = format!("SELECT {} FROM songs WHERE emotion = ?", SONG_COLUMNS);
    if language_count > 0 {
        let placeholders = vec!["?"; language_count].join(", ");
        sql.push_str(&format!(" AND language IN ({})", placeholders));
    }
    sql.push_str(" ORDER BY id");
    sql
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_song_sqlite(pool: &SqlitePool, input: &CreateSongInput) -> Result<Song> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO songs (title, artist, url, emotion, language, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.artist)
    .bind(&input.url)
    .bind(input.emotion.as_str())
    .bind(input.language.as_str())
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create song")?;

    Ok(Song {
        id: result.last_insert_rowid(),
        title: input.title.clone(),
        artist: input.artist.clone(),
        url: input.url.clone(),
        emotion: input.emotion,
        language: input.language,
        created_at: now,
    })
}

async fn list_by_emotion_sqlite(
    pool: &SqlitePool,
    emotion: Emotion,
    languages: &[Language],
) -> Result<Vec<Song>> {
    let sql = filter_sql(languages.len());
    let mut query = sqlx::query(&sql).bind(emotion.as_str());
    for language in languages {
        query = query.bind(language.as_str());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list songs by emotion")?;
    rows.iter().map(row_to_song_sqlite).collect()
}

fn row_to_song_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Song> {
    let emotion: String = row.get("emotion");
    let language: String = row.get("language");

    Ok(Song {
        id: row.get("id"),
        title: row.get("title"),
        artist: row.get("artist"),
        url: row.get("url"),
        emotion: Emotion::from_str(&emotion)?,
        language: Language::from_str(&language)?,
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_song_mysql(pool: &MySqlPool, input: &CreateSongInput) -> Result<Song> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO songs (title, artist, url, emotion, language, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.artist)
    .bind(&input.url)
    .bind(input.emotion.as_str())
    .bind(input.language.as_str())
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create song")?;

    Ok(Song {
        id: result.last_insert_id() as i64,
        title: input.title.clone(),
        artist: input.artist.clone(),
        url: input.url.clone(),
        emotion: input.emotion,
        language: input.language,
        created_at: now,
    })
}

async fn list_by_emotion_mysql(
    pool: &MySqlPool,
    emotion: Emotion,
    languages: &[Language],
) -> Result<Vec<Song>> {
    let sql = filter_sql(languages.len());
    let mut query = sqlx::query(&sql).bind(emotion.as_str());
    for language in languages {
        query = query.bind(language.as_str());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list songs by emotion")?;
    rows.iter().map(row_to_song_mysql).collect()
}

fn row_to_song_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Song> {
    let emotion: String = row.get("emotion");
    let language: String = row.get("language");

    Ok(Song {
        id: row.get("id"),
        title: row.get("title"),
        artist: row.get("artist"),
        url: row.get("url"),
        emotion: Emotion::from_str(&emotion)?,
        language: Language::from_str(&language)?,
        created_at: row.get("created_at"),
    })
}
