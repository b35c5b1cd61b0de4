//! Services layer - Business logic
//!
//! Services validate input, apply the application's rules and coordinate
//! the repositories. HTTP concerns stay in `api`.

pub mod detection;
pub mod email;
pub mod history;
pub mod password;
pub mod preference;
pub mod rate_limiter;
pub mod recommendation;
pub mod reset;
pub mod signing;
pub mod song;
pub mod stats;
pub mod user;

pub use detection::{DetectionReport, DetectionService, DetectionServiceError};
pub use email::{Mailer, OutgoingEmail, SmtpMailer};
pub use history::{HistoryError, HistoryService, UserDataExport};
pub use password::{hash_password, verify_password};
pub use preference::{PreferenceError, PreferenceService};
pub use rate_limiter::LoginRateLimiter;
pub use recommendation::RecommendationService;
pub use reset::{ResetError, ResetRequestOutcome, ResetService};
pub use signing::Signer;
pub use song::{embedded_player, AddSongRequest, SongService, SongServiceError, SongView};
pub use stats::{DashboardStats, StatsService};
pub use user::{LoginInput, SignupInput, UserService, UserServiceError};
