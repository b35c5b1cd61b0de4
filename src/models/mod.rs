//! Data models
//!
//! Database entities (User, Session, Song, HistoryEntry, PasswordResetToken),
//! the closed `Emotion` and `Language` vocabularies, and small DTOs shared
//! between services and handlers.

mod history;
mod reset_token;
mod session;
mod song;
mod user;

pub use history::{Activity, ActivityPage, HistoryEntry, PageRequest};
pub use reset_token::PasswordResetToken;
pub use session::Session;
pub use song::{CreateSongInput, Emotion, Language, Song};
pub use user::{User, UserRole};
