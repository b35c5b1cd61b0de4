//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one table.

pub mod history;
pub mod language_preference;
pub mod reset_token;
pub mod session;
pub mod song;
pub mod user;

pub use history::{HistoryRepository, SqlxHistoryRepository};
pub use language_preference::{LanguagePreferenceRepository, SqlxLanguagePreferenceRepository};
pub use reset_token::{ResetTokenRepository, SqlxResetTokenRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use song::{SongRepository, SqlxSongRepository};
pub use user::{Avatar, SqlxUserRepository, UserRepository};
