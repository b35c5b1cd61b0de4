//! Configuration management
//!
//! This module handles loading and parsing configuration for Moodify.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Face and emotion detection configuration
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Bootstrap administrator account
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/moodify.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Key used to sign session cookies and reset tokens.
    /// A random key is generated at start-up when unset.
    #[serde(default)]
    pub secret: Option<String>,
    /// Session lifetime in minutes
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: i64,
    /// Add the `Secure` attribute to the session cookie
    #[serde(default)]
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            lifetime_minutes: default_lifetime_minutes(),
            cookie_secure: false,
        }
    }
}

fn default_lifetime_minutes() -> i64 {
    30
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// ONNX face detector model
    #[serde(default = "default_face_model")]
    pub face_model: PathBuf,
    /// ONNX emotion classifier model (48x48 grayscale input)
    #[serde(default = "default_classifier_model")]
    pub classifier_model: PathBuf,
    /// Largest accepted decoded image, in bytes
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    /// Minimum face detector confidence
    #[serde(default = "default_face_confidence")]
    pub face_confidence: f32,
    /// V4L2 capture device for the live stream
    #[serde(default = "default_camera_device")]
    pub camera_device: PathBuf,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            face_model: default_face_model(),
            classifier_model: default_classifier_model(),
            max_image_bytes: default_max_image_bytes(),
            face_confidence: default_face_confidence(),
            camera_device: default_camera_device(),
        }
    }
}

fn default_face_model() -> PathBuf {
    PathBuf::from("models/face_detector.onnx")
}

fn default_classifier_model() -> PathBuf {
    PathBuf::from("models/emotion_classifier.onnx")
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_face_confidence() -> f32 {
    0.7
}

fn default_camera_device() -> PathBuf {
    PathBuf::from("/dev/video0")
}

/// Mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host. Mail is disabled when unset.
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Base URL used to build links in outgoing mail
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@moodify.local".to_string()
}

fn default_from_name() -> String {
    "Moodify".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Administrator created at start-up when a password is configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default = "default_admin_email")]
    pub email: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            email: default_admin_email(),
            name: default_admin_name(),
            password: None,
        }
    }
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@moodify.local".to_string()
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `MOODIFY_<SECTION>_<KEY>`,
    /// e.g. `MOODIFY_SERVER_PORT` or `MOODIFY_SESSION_SECRET`.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.lifetime_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "session.lifetime_minutes must be positive".to_string(),
            ));
        }
        if self.detection.max_image_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "detection.max_image_bytes must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.face_confidence) {
            return Err(ConfigError::ValidationError(
                "detection.face_confidence must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("MOODIFY_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MOODIFY_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("MOODIFY_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("MOODIFY_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("MOODIFY_DATABASE_URL") {
            self.database.url = url;
        }

        // Session configuration
        if let Ok(secret) = std::env::var("MOODIFY_SESSION_SECRET") {
            if !secret.is_empty() {
                self.session.secret = Some(secret);
            }
        }
        if let Ok(minutes) = std::env::var("MOODIFY_SESSION_LIFETIME_MINUTES") {
            if let Ok(minutes) = minutes.parse::<i64>() {
                if minutes > 0 {
                    self.session.lifetime_minutes = minutes;
                }
            }
        }

        // Detection configuration
        if let Ok(path) = std::env::var("MOODIFY_DETECTION_FACE_MODEL") {
            self.detection.face_model = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("MOODIFY_DETECTION_CLASSIFIER_MODEL") {
            self.detection.classifier_model = PathBuf::from(path);
        }
        if let Ok(bytes) = std::env::var("MOODIFY_DETECTION_MAX_IMAGE_BYTES") {
            if let Ok(bytes) = bytes.parse::<usize>() {
                if bytes > 0 {
                    self.detection.max_image_bytes = bytes;
                }
            }
        }

        // Mail configuration
        if let Ok(host) = std::env::var("MOODIFY_MAIL_SMTP_HOST") {
            self.mail.smtp_host = Some(host);
        }
        if let Ok(user) = std::env::var("MOODIFY_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = Some(user);
        }
        if let Ok(pass) = std::env::var("MOODIFY_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = Some(pass);
        }

        if let Ok(pass) = std::env::var("MOODIFY_ADMIN_PASSWORD") {
            self.admin.password = Some(pass);
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Both `tests` and `property_tests` touch process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "MOODIFY_SERVER_HOST",
    "MOODIFY_SERVER_PORT",
    "MOODIFY_SERVER_CORS_ORIGIN",
    "MOODIFY_DATABASE_DRIVER",
    "MOODIFY_DATABASE_URL",
    "MOODIFY_SESSION_SECRET",
    "MOODIFY_SESSION_LIFETIME_MINUTES",
    "MOODIFY_DETECTION_FACE_MODEL",
    "MOODIFY_DETECTION_CLASSIFIER_MODEL",
    "MOODIFY_DETECTION_MAX_IMAGE_BYTES",
    "MOODIFY_MAIL_SMTP_HOST",
    "MOODIFY_MAIL_SMTP_USERNAME",
    "MOODIFY_MAIL_SMTP_PASSWORD",
    "MOODIFY_ADMIN_PASSWORD",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}
