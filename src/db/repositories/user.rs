//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Stored profile picture
#[derive(Debug, Clone)]
pub struct Avatar {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact, case-sensitive username match
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Email match; callers pass the lower-cased address
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Change display name and email
    async fn update_profile(&self, id: i64, name: &str, email: &str) -> Result<()>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn set_avatar(&self, id: i64, avatar: &Avatar) -> Result<()>;

    async fn get_avatar(&self, id: i64) -> Result<Option<Avatar>>;

    /// Delete a user; sessions, history and preferences cascade
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.as_sqlite().unwrap(), user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.as_mysql().unwrap(), user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_where_sqlite(self.pool.as_sqlite().unwrap(), "id = ?", UserKey::Id(id)).await
            }
            DatabaseDriver::Mysql => {
                get_user_where_mysql(self.pool.as_mysql().unwrap(), "id = ?", UserKey::Id(id)).await
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let key = UserKey::Text(username);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_where_sqlite(self.pool.as_sqlite().unwrap(), "username = ?", key).await
            }
            DatabaseDriver::Mysql => {
                get_user_where_mysql(self.pool.as_mysql().unwrap(), "username = ?", key).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let key = UserKey::Text(email);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_where_sqlite(self.pool.as_sqlite().unwrap(), "email = ?", key).await
            }
            DatabaseDriver::Mysql => {
                get_user_where_mysql(self.pool.as_mysql().unwrap(), "email = ?", key).await
            }
        }
    }

    async fn update_profile(&self, id: i64, name: &str, email: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_profile_sqlite(self.pool.as_sqlite().unwrap(), id, name, email).await
            }
            DatabaseDriver::Mysql => {
                update_profile_mysql(self.pool.as_mysql().unwrap(), id, name, email).await
            }
        }
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_password_sqlite(self.pool.as_sqlite().unwrap(), id, password_hash).await
            }
            DatabaseDriver::Mysql => {
                update_password_mysql(self.pool.as_mysql().unwrap(), id, password_hash).await
            }
        }
    }

    async fn set_avatar(&self, id: i64, avatar: &Avatar) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_avatar_sqlite(self.pool.as_sqlite().unwrap(), id, avatar).await
            }
            DatabaseDriver::Mysql => set_avatar_mysql(self.pool.as_mysql().unwrap(), id, avatar).await,
        }
    }

    async fn get_avatar(&self, id: i64) -> Result<Option<Avatar>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_avatar_sqlite(self.pool.as_sqlite().unwrap(), id).await,
            DatabaseDriver::Mysql => get_avatar_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_user_sqlite(self.pool.as_sqlite().unwrap(), id).await,
            DatabaseDriver::Mysql => delete_user_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.as_sqlite().unwrap()).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.as_mysql().unwrap()).await,
        }
    }
}

/// Lookup key bound into a single-column `WHERE` clause
#[derive(Clone, Copy)]
enum UserKey<'a> {
    Id(i64),
    Text(&'a str),
}

const USER_COLUMNS: &str = "id, name, username, email, password_hash, role, \
     CASE WHEN avatar IS NULL THEN 0 ELSE 1 END AS has_avatar, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, username, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        has_avatar: false,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_where_sqlite(
    pool: &SqlitePool,
    condition: &str,
    key: UserKey<'_>,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, condition);
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Text(text) => query.bind(text),
    };

    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn update_profile_sqlite(pool: &SqlitePool, id: i64, name: &str, email: &str) -> Result<()> {
    sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update profile")?;
    Ok(())
}

async fn update_password_sqlite(pool: &SqlitePool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;
    Ok(())
}

async fn set_avatar_sqlite(pool: &SqlitePool, id: i64, avatar: &Avatar) -> Result<()> {
    sqlx::query("UPDATE users SET avatar = ?, avatar_mime = ?, updated_at = ? WHERE id = ?")
        .bind(&avatar.bytes)
        .bind(&avatar.mime)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to store profile picture")?;
    Ok(())
}

async fn get_avatar_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Avatar>> {
    let row = sqlx::query("SELECT avatar, avatar_mime FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to load profile picture")?;

    Ok(row.and_then(|row| {
        let bytes: Option<Vec<u8>> = row.get("avatar");
        let mime: Option<String> = row.get("avatar_mime");
        Some(Avatar {
            bytes: bytes?,
            mime: mime.unwrap_or_else(|| "image/png".to_string()),
        })
    }))
}

async fn delete_user_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;
    Ok(())
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;
    Ok(row.get("count"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let has_avatar: i64 = row.get("has_avatar");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str(&role_str)?,
        has_avatar: has_avatar != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, username, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        has_avatar: false,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_where_mysql(
    pool: &MySqlPool,
    condition: &str,
    key: UserKey<'_>,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, condition);
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Text(text) => query.bind(text),
    };

    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn update_profile_mysql(pool: &MySqlPool, id: i64, name: &str, email: &str) -> Result<()> {
    sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update profile")?;
    Ok(())
}

async fn update_password_mysql(pool: &MySqlPool, id: i64, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;
    Ok(())
}

async fn set_avatar_mysql(pool: &MySqlPool, id: i64, avatar: &Avatar) -> Result<()> {
    sqlx::query("UPDATE users SET avatar = ?, avatar_mime = ?, updated_at = ? WHERE id = ?")
        .bind(&avatar.bytes)
        .bind(&avatar.mime)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to store profile picture")?;
    Ok(())
}

async fn get_avatar_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Avatar>> {
    let row = sqlx::query("SELECT avatar, avatar_mime FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to load profile picture")?;

    Ok(row.and_then(|row| {
        let bytes: Option<Vec<u8>> = row.get("avatar");
        let mime: Option<String> = row.get("avatar_mime");
        Some(Avatar {
            bytes: bytes?,
            mime: mime.unwrap_or_else(|| "image/png".to_string()),
        })
    }))
}

async fn delete_user_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;
    Ok(())
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;
    Ok(row.get("count"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let has_avatar: i64 = row.get("has_avatar");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str(&role_str)?,
        has_avatar: has_avatar != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
