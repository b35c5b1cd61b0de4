//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and MySQL behind the
//! `DatabasePool` trait, so repositories never name a backend directly
//! outside their per-driver query functions.
//!
//! # Usage
//!
//! ```ignore
//! use moodify::config::DatabaseConfig;
//! use moodify::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
