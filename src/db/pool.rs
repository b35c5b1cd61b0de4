//! Database connection pool abstraction
//!
//! A unified interface over the SQLite and MySQL backends. The concrete pool
//! is picked from `DatabaseConfig::driver`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// Database pool trait that abstracts over different database backends.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a raw SQL statement that doesn't return rows
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Check if the database connection is healthy
    async fn ping(&self) -> Result<()>;

    /// Close the connection pool
    async fn close(&self);

    /// Get the database driver type
    fn driver(&self) -> DatabaseDriver;

    /// Get the underlying SQLite pool if this is a SQLite connection
    fn as_sqlite(&self) -> Option<&SqlitePool>;

    /// Get the underlying MySQL pool if this is a MySQL connection
    fn as_mysql(&self) -> Option<&MySqlPool>;
}

/// SQLite connection pool implementation
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Create a new SQLite connection pool
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = url.starts_with(":memory:") || url.starts_with("sqlite::memory:");

        if !in_memory {
            let path = url.trim_start_matches("sqlite:");
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
                }
            }
        }

        let connection_url = if url.starts_with("sqlite:") {
            if url.contains('?') {
                url.to_string()
            } else {
                format!("{}?mode=rwc", url)
            }
        } else if url == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", url)
        };

        // Every in-memory connection is its own database, so keep exactly one alive.
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = options
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                    Ok(())
                })
            })
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

/// MySQL connection pool implementation
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    /// Create a new MySQL connection pool
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to MySQL database: {}", url))?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

/// Type alias for a shared database pool
pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Create a database connection pool based on configuration.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    match config.driver {
        DatabaseDriver::Sqlite => {
            let db = SqliteDatabase::new(&config.url, config.max_connections).await?;
            Ok(Arc::new(db))
        }
        DatabaseDriver::Mysql => {
            let db = MysqlDatabase::new(&config.url, config.max_connections).await?;
            Ok(Arc::new(db))
        }
    }
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
        max_connections: 1,
    };
    create_pool(&config).await
}
