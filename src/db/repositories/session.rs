//! Session repository
//!
//! Database operations for login sessions.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<i64>;

    /// Count sessions that have not expired yet
    async fn count_active(&self) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => {
                create_session_mysql(self.pool.as_mysql().unwrap(), session).await
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_session_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_session_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql).bind(id).execute(self.pool.as_sqlite().unwrap()).await
                    .context("Failed to delete session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql).bind(id).execute(self.pool.as_mysql().unwrap()).await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE user_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql).bind(user_id).execute(self.pool.as_sqlite().unwrap()).await
                    .context("Failed to delete sessions by user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql).bind(user_id).execute(self.pool.as_mysql().unwrap()).await
                    .context("Failed to delete sessions by user")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql).bind(now).execute(self.pool.as_sqlite().unwrap()).await
                    .context("Failed to delete expired sessions")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql).bind(now).execute(self.pool.as_mysql().unwrap()).await
                    .context("Failed to delete expired sessions")?
                    .rows_affected()
            }
        };
        Ok(affected as i64)
    }

    async fn count_active(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM sessions WHERE expires_at >= ?";
        let now = Utc::now();
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql).bind(now).fetch_one(self.pool.as_sqlite().unwrap()).await
                    .context("Failed to count sessions")?
                    .get("count")
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql).bind(now).fetch_one(self.pool.as_mysql().unwrap()).await
                    .context("Failed to count sessions")?
                    .get("count")
            }
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::testing::{insert_user, setup_pool};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = setup_pool().await;
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = insert_user(&pool, "listener").await;

        let session = Session::start(user_id, Duration::minutes(30));
        repo.create(&session).await.expect("Failed to create session");

        let found = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get session")
            .expect("Session not found");
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_delete_by_user() {
        let (pool, repo) = setup_test_repo().await;
        let a = insert_user(&pool, "a").await;
        let b = insert_user(&pool, "b").await;

        let s1 = Session::start(a, Duration::minutes(30));
        let s2 = Session::start(a, Duration::minutes(30));
        let s3 = Session::start(b, Duration::minutes(30));
        for s in [&s1, &s2, &s3] {
            repo.create(s).await.unwrap();
        }

        repo.delete(&s1.id).await.unwrap();
        assert!(repo.get_by_id(&s1.id).await.unwrap().is_none());

        repo.delete_by_user(a).await.unwrap();
        assert!(repo.get_by_id(&s2.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&s3.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_purged_and_not_counted() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = insert_user(&pool, "sleepy").await;

        repo.create(&Session::start(user_id, Duration::minutes(-5))).await.unwrap();
        repo.create(&Session::start(user_id, Duration::minutes(30))).await.unwrap();

        assert_eq!(repo.count_active().await.unwrap(), 1);
        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert_eq!(repo.count_active().await.unwrap(), 1);
    }
}
