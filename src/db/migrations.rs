//! Database migrations module
//!
//! Code-based migrations embedded in the binary as SQL strings, one variant
//! for SQLite and one for MySQL.
//!
//! # Usage
//!
//! ```ignore
//! use moodify::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each `Migration` carries a unique `version`, a `name`, and the
//! `up_sqlite` / `up_mysql` statements. Applied versions are tracked in the
//! `_migrations` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                avatar BLOB,
                avatar_mime VARCHAR(50),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                avatar MEDIUMBLOB,
                avatar_mime VARCHAR(50),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            ) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin;
            CREATE INDEX idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_songs",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS songs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                artist VARCHAR(255) NOT NULL,
                url VARCHAR(1024) NOT NULL,
                emotion VARCHAR(32) NOT NULL,
                language VARCHAR(32) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_songs_emotion_language ON songs(emotion, language);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS songs (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                artist VARCHAR(255) NOT NULL,
                url VARCHAR(1024) NOT NULL,
                emotion VARCHAR(32) NOT NULL,
                language VARCHAR(32) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_songs_emotion_language ON songs(emotion, language);
        "#,
    },
    Migration {
        version: 4,
        name: "create_user_history",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS user_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                emotion VARCHAR(32) NOT NULL,
                song_id INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (song_id) REFERENCES songs(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_history_user_id ON user_history(user_id, created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS user_history (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                emotion VARCHAR(32) NOT NULL,
                song_id BIGINT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (song_id) REFERENCES songs(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_user_history_user_id ON user_history(user_id, created_at);
        "#,
    },
    Migration {
        version: 5,
        name: "create_user_language_preferences",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS user_language_preferences (
                user_id INTEGER NOT NULL,
                language VARCHAR(32) NOT NULL,
                PRIMARY KEY (user_id, language),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS user_language_preferences (
                user_id BIGINT NOT NULL,
                language VARCHAR(32) NOT NULL,
                PRIMARY KEY (user_id, language),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_password_reset_tokens",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS password_reset_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token_hash VARCHAR(64) NOT NULL UNIQUE,
                expires_at TIMESTAMP NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_reset_tokens_user_id ON password_reset_tokens(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS password_reset_tokens (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                token_hash VARCHAR(64) NOT NULL UNIQUE,
                expires_at TIMESTAMP NOT NULL,
                used BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_reset_tokens_user_id ON password_reset_tokens(user_id);
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.as_sqlite().unwrap()).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.as_mysql().unwrap()).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            apply_migration_sqlite(pool.as_sqlite().unwrap(), migration).await
        }
        DatabaseDriver::Mysql => {
            apply_migration_mysql(pool.as_mysql().unwrap(), migration).await
        }
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin migration")?;

    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await.context("Failed to commit migration")?;
    Ok(())
}

// MySQL DDL commits implicitly, so statements run straight on the pool.
async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}
