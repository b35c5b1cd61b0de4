//! Password hashing and policy
//!
//! Argon2id with the crate's default parameters and a fresh random salt per
//! hash. Hashes are stored as PHC strings.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Shortest accepted password, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password using Argon2id.
///
/// ```ignore
/// let hash = hash_password("correct horse")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash
/// cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Check a new password against the policy, returning a user-facing message.
pub fn check_password_policy(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if password.trim().is_empty() {
        return Err("Password cannot be blank".to_string());
    }
    Ok(())
}
