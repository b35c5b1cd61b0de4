//! Password reset token record

use chrono::{DateTime, Utc};

/// Stored form of an issued reset token. Only the SHA-256 of the token is kept.
#[derive(Debug, Clone)]
pub struct PasswordResetToken {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Unused and not yet expired
    pub fn is_redeemable(&self) -> bool {
        !self.used && !self.is_expired()
    }
}
