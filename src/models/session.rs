//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Server-side login session. The id travels in the signed cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for `user_id` that lasts `lifetime`.
    pub fn start(user_id: i64, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + lifetime,
            created_at: now,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
