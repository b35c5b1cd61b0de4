//! Password reset flow
//!
//! A reset token is `base64url(user_id:nonce:expiry_unix)` signed with the
//! server key. Only the SHA-256 of the full token is stored, so a database
//! dump cannot be replayed as links.

use crate::db::repositories::{ResetTokenRepository, UserRepository};
use crate::models::PasswordResetToken;
use crate::services::email::{reset_email, Mailer};
use crate::services::password::{check_password_policy, hash_password};
use crate::services::signing::{random_token, sha256_hex, Signer};
use crate::services::user::normalize_email;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use std::sync::Arc;

/// Tokens are valid for one hour
pub const RESET_TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Shown when the mail server cannot be reached
pub const DELIVERY_FAILED_MESSAGE: &str =
    "We could not send the reset email right now. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("This reset link is invalid or has expired")]
    InvalidToken,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What happened to a reset request. Callers show the same page for
/// `Sent` and `UnknownEmail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRequestOutcome {
    Sent,
    UnknownEmail,
    DeliveryFailed,
}

/// Claims carried inside a signed token
#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenClaims {
    user_id: i64,
    expires_at: i64,
}

pub struct ResetService {
    user_repo: Arc<dyn UserRepository>,
    token_repo: Arc<dyn ResetTokenRepository>,
    mailer: Arc<dyn Mailer>,
    signer: Signer,
    public_base_url: String,
}

impl ResetService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        token_repo: Arc<dyn ResetTokenRepository>,
        mailer: Arc<dyn Mailer>,
        signer: Signer,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            user_repo,
            token_repo,
            mailer,
            signer,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Issue a token for `email` and mail the link.
    pub async fn request_reset(&self, email: &str) -> Result<ResetRequestOutcome, ResetError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ResetError::ValidationError("Email is required".to_string()));
        }

        let Some(user) = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to look up user")?
        else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(ResetRequestOutcome::UnknownEmail);
        };

        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_LIFETIME_MINUTES);
        let token = self.issue_token(user.id, expires_at);
        self.token_repo
            .create(user.id, &sha256_hex(&token), expires_at)
            .await
            .context("Failed to store reset token")?;

        let link = format!("{}/reset_password/{}", self.public_base_url, token);
        match self
            .mailer
            .send(reset_email(&user.email, &user.name, &link))
            .await
        {
            Ok(()) => {
                tracing::info!(user_id = user.id, "password reset email sent");
                Ok(ResetRequestOutcome::Sent)
            }
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "failed to send password reset email");
                Ok(ResetRequestOutcome::DeliveryFailed)
            }
        }
    }

    /// Check a token without consuming it
    pub async fn check_token(&self, token: &str) -> Result<PasswordResetToken, ResetError> {
        let claims = self.verify_claims(token)?;

        let stored = self
            .token_repo
            .get_by_hash(&sha256_hex(token))
            .await
            .context("Failed to look up reset token")?
            .ok_or(ResetError::InvalidToken)?;

        if stored.user_id != claims.user_id || !stored.is_redeemable() {
            return Err(ResetError::InvalidToken);
        }
        Ok(stored)
    }

    /// Set a new password. The token is consumed and the user's sessions are
    /// revoked in the same transaction.
    pub async fn redeem(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), ResetError> {
        let stored = self.check_token(token).await?;

        if password != confirm_password {
            return Err(ResetError::ValidationError(
                "Passwords do not match".to_string(),
            ));
        }
        check_password_policy(password).map_err(ResetError::ValidationError)?;

        let hash = hash_password(password).context("Failed to hash password")?;
        let redeemed = self
            .token_repo
            .redeem(stored.id, stored.user_id, &hash)
            .await
            .context("Failed to redeem reset token")?;
        if !redeemed {
            return Err(ResetError::InvalidToken);
        }

        tracing::info!(user_id = stored.user_id, "password reset completed");
        Ok(())
    }

    /// Remove used and expired tokens
    pub async fn cleanup(&self) -> Result<i64, ResetError> {
        Ok(self
            .token_repo
            .delete_stale()
            .await
            .context("Failed to delete stale reset tokens")?)
    }

    fn issue_token(&self, user_id: i64, expires_at: DateTime<Utc>) -> String {
        let claims = format!("{}:{}:{}", user_id, random_token(16), expires_at.timestamp());
        self.signer.sign(&BASE64URL_NOPAD.encode(claims.as_bytes()))
    }

    fn verify_claims(&self, token: &str) -> Result<TokenClaims, ResetError> {
        let payload = self.signer.verify(token).ok_or(ResetError::InvalidToken)?;
        let claims = parse_claims(payload).ok_or(ResetError::InvalidToken)?;
        if claims.expires_at < Utc::now().timestamp() {
            return Err(ResetError::InvalidToken);
        }
        Ok(claims)
    }
}

fn parse_claims(payload: &str) -> Option<TokenClaims> {
    let raw = BASE64URL_NOPAD.decode(payload.as_bytes()).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let mut parts = text.splitn(3, ':');
    let user_id = parts.next()?.parse().ok()?;
    let _nonce = parts.next().filter(|n| !n.is_empty())?;
    let expires_at = parts.next()?.parse().ok()?;
    Some(TokenClaims {
        user_id,
        expires_at,
    })
}
