//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered listener or administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Display name
    pub name: String,
    /// Login name (unique, case-sensitive)
    pub username: String,
    /// Email address (unique, stored lower-cased)
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    /// Whether a profile picture is stored (bytes are fetched separately)
    pub has_avatar: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. The password must already be hashed.
    pub fn new(
        name: String,
        username: String,
        email: String,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            name,
            username,
            email,
            password_hash,
            role,
            has_avatar: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Account role. Admins manage the song catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}
