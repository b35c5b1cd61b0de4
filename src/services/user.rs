//! User service
//!
//! Account lifecycle for listeners and administrators:
//! - signup with name, username, email and a confirmed password
//! - login by username or email, logout, session validation
//! - profile, password and profile picture updates
//! - account deletion and the start-up administrator account

use crate::config::AdminConfig;
use crate::db::repositories::{Avatar, SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use anyhow::Context;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Default session lifetime in minutes
const DEFAULT_SESSION_MINUTES: i64 = 30;

const MAX_USERNAME_LENGTH: usize = 50;
const MAX_NAME_LENGTH: usize = 100;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_lifetime: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_lifetime(user_repo, session_repo, DEFAULT_SESSION_MINUTES)
    }

    /// Create a service whose sessions last `minutes`
    pub fn with_session_lifetime(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        minutes: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_lifetime: Duration::minutes(minutes),
        }
    }

    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }

    /// Register a new listener account.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for missing fields, mismatched passwords, a weak
    ///   password or a malformed email
    /// - `UserExists` if the username or email is already taken
    pub async fn signup(&self, input: SignupInput) -> Result<User, UserServiceError> {
        let input = input.normalized();
        validate_signup_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "Username already exists".to_string(),
            ));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "Email already registered".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.name, input.username, input.email, password_hash, UserRole::User);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, username = %created.username, "user signed up");
        Ok(created)
    }

    /// Login with a username or email plus password.
    ///
    /// Returns the user and a freshly created session.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError("Invalid username or password".to_string())
        };

        if input.identifier.trim().is_empty() || input.password.is_empty() {
            return Err(invalid());
        }

        let user = self
            .find_by_username_or_email(input.identifier.trim())
            .await?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        let session = self.start_session(user.id).await?;
        Ok((user, session))
    }

    /// Create a session for an already authenticated user
    pub async fn start_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::start(user_id, self.session_lifetime);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }

    /// Invalidate a session. Unknown ids are ignored.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session id to its user.
    ///
    /// Expired sessions are deleted and treated as absent.
    pub async fn validate_session(&self, session_id: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(session_id)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(session_id).await {
                tracing::warn!(error = %e, "failed to remove expired session");
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    /// Look a user up by email, ignoring case
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await
            .context("Failed to get user by email")?;
        Ok(user)
    }

    /// Change display name and email
    pub async fn update_profile(
        &self,
        user_id: i64,
        name: &str,
        email: &str,
    ) -> Result<User, UserServiceError> {
        let name = name.trim();
        let email = normalize_email(email);
        validate_name(name)?;
        validate_email(&email)?;

        if let Some(existing) = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
        {
            if existing.id != user_id {
                return Err(UserServiceError::UserExists(
                    "Email already registered".to_string(),
                ));
            }
        }

        self.user_repo
            .update_profile(user_id, name, &email)
            .await
            .context("Failed to update profile")?;

        self.get_by_id(user_id).await?.ok_or(UserServiceError::NotFound)
    }

    /// Replace the password after checking the current one
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        let user = self.get_by_id(user_id).await?.ok_or(UserServiceError::NotFound)?;

        let current_valid = verify_password(current_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !current_valid {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        check_password_policy(new_password).map_err(UserServiceError::ValidationError)?;

        let hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user_id, &hash)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    /// Store a profile picture. The bytes must be a PNG, JPEG, GIF or WebP image.
    pub async fn update_avatar(&self, user_id: i64, bytes: Vec<u8>) -> Result<(), UserServiceError> {
        let mime = match image::guess_format(&bytes) {
            Ok(image::ImageFormat::Png) => "image/png",
            Ok(image::ImageFormat::Jpeg) => "image/jpeg",
            Ok(image::ImageFormat::Gif) => "image/gif",
            Ok(image::ImageFormat::WebP) => "image/webp",
            _ => {
                return Err(UserServiceError::ValidationError(
                    "Unsupported image format".to_string(),
                ))
            }
        };

        self.user_repo
            .set_avatar(
                user_id,
                &Avatar {
                    bytes,
                    mime: mime.to_string(),
                },
            )
            .await
            .context("Failed to store profile picture")?;
        Ok(())
    }

    pub async fn avatar(&self, user_id: i64) -> Result<Option<Avatar>, UserServiceError> {
        let avatar = self
            .user_repo
            .get_avatar(user_id)
            .await
            .context("Failed to load profile picture")?;
        Ok(avatar)
    }

    /// Delete an account. Sessions, history and preferences go with it.
    pub async fn delete_account(&self, user_id: i64) -> Result<(), UserServiceError> {
        self.user_repo
            .delete(user_id)
            .await
            .context("Failed to delete user")?;
        tracing::info!(user_id, "account deleted");
        Ok(())
    }

    /// Create the configured administrator if no account uses that username.
    ///
    /// Returns true when an account was created.
    pub async fn ensure_admin(&self, admin: &AdminConfig) -> Result<bool, UserServiceError> {
        let Some(password) = admin.password.as_deref() else {
            return Ok(false);
        };

        if self
            .user_repo
            .get_by_username(&admin.username)
            .await
            .context("Failed to check admin username")?
            .is_some()
        {
            return Ok(false);
        }

        check_password_policy(password).map_err(UserServiceError::ValidationError)?;
        let email = normalize_email(&admin.email);
        validate_email(&email)?;

        let hash = hash_password(password).context("Failed to hash password")?;
        let user = User::new(admin.name.clone(), admin.username.clone(), email, hash, UserRole::Admin);
        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create admin user")?;

        tracing::info!(user_id = created.id, username = %created.username, "created administrator account");
        Ok(true)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(identifier)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(&normalize_email(identifier))
            .await
            .context("Failed to get user by email")?;
        Ok(user)
    }
}

/// Emails are compared and stored trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::ValidationError("Email is required".to_string()));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), UserServiceError> {
    if name.is_empty() {
        return Err(UserServiceError::ValidationError("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(UserServiceError::ValidationError("Name is too long".to_string()));
    }
    Ok(())
}

fn validate_signup_input(input: &SignupInput) -> Result<(), UserServiceError> {
    validate_name(&input.name)?;

    if input.username.is_empty() {
        return Err(UserServiceError::ValidationError("Username is required".to_string()));
    }
    if input.username.chars().count() > MAX_USERNAME_LENGTH
        || input.username.chars().any(char::is_whitespace)
    {
        return Err(UserServiceError::ValidationError(
            "Username must be at most 50 characters with no spaces".to_string(),
        ));
    }

    validate_email(&input.email)?;

    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError("Password is required".to_string()));
    }
    if input.password != input.confirm_password {
        return Err(UserServiceError::ValidationError(
            "Passwords do not match".to_string(),
        ));
    }
    check_password_policy(&input.password).map_err(UserServiceError::ValidationError)
}

/// Signup form fields
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupInput {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
        }
    }

    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            username: self.username.trim().to_string(),
            email: normalize_email(&self.email),
            ..self
        }
    }
}

/// Login form fields. `identifier` is a username or an email.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub identifier: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    pub(crate) async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        (pool, UserService::new(user_repo, session_repo))
    }

    fn signup(username: &str, email: &str) -> SignupInput {
        SignupInput::new("Test Listener", username, email, "password123", "password123")
    }

    #[tokio::test]
    async fn test_signup_creates_regular_user() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .signup(signup("meera", "Meera@Example.com "))
            .await
            .expect("Signup should succeed");

        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.email, "meera@example.com");
        assert_ne!(user.password_hash, "password123");
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_username() {
        let (_pool, service) = setup_test_service().await;
        service.signup(signup("dup", "one@example.com")).await.unwrap();

        let result = service.signup(signup("dup", "two@example.com")).await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email_ignoring_case() {
        let (_pool, service) = setup_test_service().await;
        service.signup(signup("first", "same@example.com")).await.unwrap();

        let result = service.signup(signup("second", "SAME@example.com")).await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_usernames_differing_in_case_are_distinct() {
        let (_pool, service) = setup_test_service().await;
        service.signup(signup("Ravi", "ravi1@example.com")).await.unwrap();
        assert!(service.signup(signup("ravi", "ravi2@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let (_pool, service) = setup_test_service().await;

        let mismatch = SignupInput::new("N", "u1", "u1@example.com", "password123", "password321");
        let short = SignupInput::new("N", "u2", "u2@example.com", "short", "short");
        let bad_email = SignupInput::new("N", "u3", "not-an-email", "password123", "password123");
        let no_name = SignupInput::new("  ", "u4", "u4@example.com", "password123", "password123");
        let spaced = SignupInput::new("N", "two words", "u5@example.com", "password123", "password123");

        for input in [mismatch, short, bad_email, no_name, spaced] {
            let result = service.signup(input).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_login_with_username_or_email() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup("kavya", "kavya@example.com")).await.unwrap();

        let (by_name, _) = service.login(LoginInput::new("kavya", "password123")).await.unwrap();
        let (by_email, _) = service
            .login(LoginInput::new("KAVYA@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_share_message() {
        let (_pool, service) = setup_test_service().await;
        service.signup(signup("arjun", "arjun@example.com")).await.unwrap();

        let wrong = service.login(LoginInput::new("arjun", "wrongpass")).await;
        let missing = service.login(LoginInput::new("ghost", "password123")).await;

        match (wrong, missing) {
            (
                Err(UserServiceError::AuthenticationError(a)),
                Err(UserServiceError::AuthenticationError(b)),
            ) => assert_eq!(a, b),
            other => panic!("unexpected results: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup("sess", "sess@example.com")).await.unwrap();
        let (_, session) = service.login(LoginInput::new("sess", "password123")).await.unwrap();

        assert_eq!((session.expires_at - session.created_at).num_minutes(), 30);
        let validated = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(validated.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        service.logout("unknown").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let (pool, _) = setup_test_service().await;
        let service = UserService::with_session_lifetime(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            -1,
        );
        let user = service.signup(signup("old", "old@example.com")).await.unwrap();
        let session = service.start_session(user.id).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_profile_checks_email_owner() {
        let (_pool, service) = setup_test_service().await;
        let a = service.signup(signup("a", "a@example.com")).await.unwrap();
        service.signup(signup("b", "b@example.com")).await.unwrap();

        let updated = service.update_profile(a.id, "Anita", "A@example.com").await.unwrap();
        assert_eq!(updated.name, "Anita");
        assert_eq!(updated.email, "a@example.com");

        let taken = service.update_profile(a.id, "Anita", "b@example.com").await;
        assert!(matches!(taken, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup("pw", "pw@example.com")).await.unwrap();

        let wrong = service.change_password(user.id, "nope", "newpassword1").await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let weak = service.change_password(user.id, "password123", "short").await;
        assert!(matches!(weak, Err(UserServiceError::ValidationError(_))));

        service.change_password(user.id, "password123", "newpassword1").await.unwrap();
        assert!(service.login(LoginInput::new("pw", "newpassword1")).await.is_ok());
        assert!(service.login(LoginInput::new("pw", "password123")).await.is_err());
    }

    #[tokio::test]
    async fn test_avatar_requires_image_bytes() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup("face", "face@example.com")).await.unwrap();

        let not_image = service.update_avatar(user.id, b"plain text".to_vec()).await;
        assert!(matches!(not_image, Err(UserServiceError::ValidationError(_))));

        let mut png = Vec::new();
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        service.update_avatar(user.id, png.clone()).await.unwrap();

        let stored = service.avatar(user.id).await.unwrap().unwrap();
        assert_eq!(stored.mime, "image/png");
        assert_eq!(stored.bytes, png);
    }

    #[tokio::test]
    async fn test_delete_account() {
        let (_pool, service) = setup_test_service().await;
        let user = service.signup(signup("bye", "bye@example.com")).await.unwrap();
        let session = service.start_session(user.id).await.unwrap();

        service.delete_account(user.id).await.unwrap();
        assert!(service.get_by_id(user.id).await.unwrap().is_none());
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let (_pool, service) = setup_test_service().await;
        let config = AdminConfig {
            password: Some("adminpass1".to_string()),
            ..AdminConfig::default()
        };

        assert!(service.ensure_admin(&config).await.unwrap());
        assert!(!service.ensure_admin(&config).await.unwrap());

        let (admin, _) = service.login(LoginInput::new("admin", "adminpass1")).await.unwrap();
        assert!(admin.is_admin());

        let no_password = AdminConfig::default();
        assert!(!service.ensure_admin(&no_password).await.unwrap());
    }
}
