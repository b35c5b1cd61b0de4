//! Password reset token repository
//!
//! Tokens are looked up by the SHA-256 of the value that was mailed out.
//! Redemption marks the token used, swaps the password hash and drops the
//! user's sessions in a single transaction.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::PasswordResetToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ResetTokenRepository: Send + Sync {
    async fn create(&self, user_id: i64, token_hash: &str, expires_at: DateTime<Utc>) -> Result<PasswordResetToken>;

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>>;

    /// Consume the token and set the new password hash. Returns false when the
    /// token was already used or has expired; nothing is changed in that case.
    async fn redeem(&self, token_id: i64, user_id: i64, password_hash: &str) -> Result<bool>;

    /// Remove used and expired tokens
    async fn delete_stale(&self) -> Result<i64>;
}

pub struct SqlxResetTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxResetTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ResetTokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ResetTokenRepository for SqlxResetTokenRepository {
    async fn create(&self, user_id: i64, token_hash: &str, expires_at: DateTime<Utc>) -> Result<PasswordResetToken> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at, used, created_at)
            VALUES (?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(token_hash)
                .bind(expires_at)
                .bind(false)
                .bind(now)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to store reset token")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(token_hash)
                .bind(expires_at)
                .bind(false)
                .bind(now)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to store reset token")?
                .last_insert_id() as i64,
        };

        Ok(PasswordResetToken {
            id,
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used: false,
            created_at: now,
        })
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_by_hash_sqlite(self.pool.as_sqlite().unwrap(), token_hash).await
            }
            DatabaseDriver::Mysql => {
                get_by_hash_mysql(self.pool.as_mysql().unwrap(), token_hash).await
            }
        }
    }

    async fn redeem(&self, token_id: i64, user_id: i64, password_hash: &str) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                redeem_sqlite(self.pool.as_sqlite().unwrap(), token_id, user_id, password_hash).await
            }
            DatabaseDriver::Mysql => {
                redeem_mysql(self.pool.as_mysql().unwrap(), token_id, user_id, password_hash).await
            }
        }
    }

    async fn delete_stale(&self) -> Result<i64> {
        let sql = "DELETE FROM password_reset_tokens WHERE used = ? OR expires_at < ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(true)
                .bind(now)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete stale reset tokens")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(true)
                .bind(now)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete stale reset tokens")?
                .rows_affected(),
        };
        Ok(affected as i64)
    }
}

const TOKEN_BY_HASH_SQL: &str = r#"
    SELECT id, user_id, token_hash, expires_at, used, created_at
    FROM password_reset_tokens
    WHERE token_hash = ?
"#;

const CONSUME_TOKEN_SQL: &str = r#"
    UPDATE password_reset_tokens
    SET used = ?
    WHERE id = ? AND user_id = ? AND used = ? AND expires_at >= ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_by_hash_sqlite(pool: &SqlitePool, token_hash: &str) -> Result<Option<PasswordResetToken>> {
    let row = sqlx::query(TOKEN_BY_HASH_SQL)
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .context("Failed to look up reset token")?;

    Ok(row.map(|row| PasswordResetToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
        used: row.get("used"),
        created_at: row.get("created_at"),
    }))
}

async fn redeem_sqlite(pool: &SqlitePool, token_id: i64, user_id: i64, password_hash: &str) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let consumed = sqlx::query(CONSUME_TOKEN_SQL)
        .bind(true)
        .bind(token_id)
        .bind(user_id)
        .bind(false)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to consume reset token")?
        .rows_affected();
    if consumed == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update password")?;

    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to revoke sessions")?;

    tx.commit().await.context("Failed to commit password reset")?;
    Ok(true)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_by_hash_mysql(pool: &MySqlPool, token_hash: &str) -> Result<Option<PasswordResetToken>> {
    let row = sqlx::query(TOKEN_BY_HASH_SQL)
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .context("Failed to look up reset token")?;

    Ok(row.map(|row| PasswordResetToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
        used: row.get("used"),
        created_at: row.get("created_at"),
    }))
}

async fn redeem_mysql(pool: &MySqlPool, token_id: i64, user_id: i64, password_hash: &str) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let consumed = sqlx::query(CONSUME_TOKEN_SQL)
        .bind(true)
        .bind(token_id)
        .bind(user_id)
        .bind(false)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to consume reset token")?
        .rows_affected();
    if consumed == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update password")?;

    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to revoke sessions")?;

    tx.commit().await.context("Failed to commit password reset")?;
    Ok(true)
}
