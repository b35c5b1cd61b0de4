//! History repository
//!
//! Append-only per-user log of detections and song selections.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Activity, ActivityPage, Emotion, HistoryEntry, PageRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Append an entry. `song_id` is None for a bare detection.
    async fn append(&self, user_id: i64, emotion: Emotion, song_id: Option<i64>) -> Result<HistoryEntry>;

    /// Newest-first page of a user's activity, joined with song details
    async fn list_activity(&self, user_id: i64, page: PageRequest) -> Result<ActivityPage>;

    /// Every entry for a user, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<HistoryEntry>>;

    /// Remove a user's whole history, returning the number of rows removed
    async fn clear_for_user(&self, user_id: i64) -> Result<u64>;

    /// Number of recorded detections across all users
    async fn count_detections(&self) -> Result<i64>;
}

pub struct SqlxHistoryRepository {
    pool: DynDatabasePool,
}

impl SqlxHistoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn HistoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl HistoryRepository for SqlxHistoryRepository {
    async fn append(&self, user_id: i64, emotion: Emotion, song_id: Option<i64>) -> Result<HistoryEntry> {
        let now = Utc::now();
        let sql = "INSERT INTO user_history (user_id, emotion, song_id, created_at) VALUES (?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(emotion.as_str())
                .bind(song_id)
                .bind(now)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to append history entry")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(emotion.as_str())
                .bind(song_id)
                .bind(now)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to append history entry")?
                .last_insert_id() as i64,
        };

        Ok(HistoryEntry {
            id,
            user_id,
            emotion,
            song_id,
            created_at: now,
        })
    }

    async fn list_activity(&self, user_id: i64, page: PageRequest) -> Result<ActivityPage> {
        let mut activities = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_activity_sqlite(self.pool.as_sqlite().unwrap(), user_id, page).await?
            }
            DatabaseDriver::Mysql => {
                list_activity_mysql(self.pool.as_mysql().unwrap(), user_id, page).await?
            }
        };

        // One extra row was fetched to learn whether another page exists.
        let has_more = activities.len() > page.limit as usize;
        activities.truncate(page.limit as usize);
        Ok(ActivityPage { activities, has_more })
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<HistoryEntry>> {
        let sql = r#"
            SELECT id, user_id, emotion, song_id, created_at
            FROM user_history
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(user_id)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list history")?;
                rows.iter().map(row_to_entry_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(user_id)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list history")?;
                rows.iter().map(row_to_entry_mysql).collect()
            }
        }
    }

    async fn clear_for_user(&self, user_id: i64) -> Result<u64> {
        let sql = "DELETE FROM user_history WHERE user_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to clear history")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to clear history")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn count_detections(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM user_history WHERE song_id IS NULL";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count detections")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count detections")?
                .get("count"),
        };
        Ok(count)
    }
}

const ACTIVITY_SQL: &str = r#"
    SELECT h.id, h.emotion, h.song_id, h.created_at,
           s.title AS song_title, s.artist AS song_artist
    FROM user_history h
    LEFT JOIN songs s ON s.id = h.song_id
    WHERE h.user_id = ?
    ORDER BY h.created_at DESC, h.id DESC
    LIMIT ? OFFSET ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_activity_sqlite(pool: &SqlitePool, user_id: i64, page: PageRequest) -> Result<Vec<Activity>> {
    let rows = sqlx::query(ACTIVITY_SQL)
        .bind(user_id)
        .bind(page.limit as i64 + 1)
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list activity")?;

    rows.iter()
        .map(|row| {
            let emotion: String = row.get("emotion");
            Ok(Activity {
                id: row.get("id"),
                emotion: Emotion::from_str(&emotion)?,
                song_id: row.get("song_id"),
                song_title: row.get("song_title"),
                song_artist: row.get("song_artist"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

fn row_to_entry_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry> {
    let emotion: String = row.get("emotion");
    Ok(HistoryEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        emotion: Emotion::from_str(&emotion)?,
        song_id: row.get("song_id"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_activity_mysql(pool: &MySqlPool, user_id: i64, page: PageRequest) -> Result<Vec<Activity>> {
    let rows = sqlx::query(ACTIVITY_SQL)
        .bind(user_id)
        .bind(page.limit as i64 + 1)
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list activity")?;

    rows.iter()
        .map(|row| {
            let emotion: String = row.get("emotion");
            Ok(Activity {
                id: row.get("id"),
                emotion: Emotion::from_str(&emotion)?,
                song_id: row.get("song_id"),
                song_title: row.get("song_title"),
                song_artist: row.get("song_artist"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

fn row_to_entry_mysql(row: &sqlx::mysql::MySqlRow) -> Result<HistoryEntry> {
    let emotion: String = row.get("emotion");
    Ok(HistoryEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        emotion: Emotion::from_str(&emotion)?,
        song_id: row.get("song_id"),
        created_at: row.get("created_at"),
    })
}
