//! Song catalogue service
//!
//! Admin add/delete, catalogue listings and the embedded player markup
//! shown next to every recommendation.

use crate::db::repositories::SongRepository;
use crate::models::{CreateSongInput, Emotion, Language, Song};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

const MAX_FIELD_LENGTH: usize = 255;
const MAX_URL_LENGTH: usize = 2048;

static YOUTUBE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("youtube id pattern compiles"));
static SPOTIFY_TRACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"spotify\.com/(?:[a-z-]+/)?track/([A-Za-z0-9]+)").expect("spotify pattern compiles")
});

#[derive(Debug, thiserror::Error)]
pub enum SongServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Song not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Raw admin form; emotion and language arrive as free text
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AddSongRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// A song as sent to the browser
#[derive(Debug, Clone, Serialize)]
pub struct SongView {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub url: String,
    pub emotion: Emotion,
    pub language: Language,
    pub embed_html: String,
}

impl From<Song> for SongView {
    fn from(song: Song) -> Self {
        let embed_html = embedded_player(&song.url);
        Self {
            id: song.id,
            title: song.title,
            artist: song.artist,
            url: song.url,
            emotion: song.emotion,
            language: song.language,
            embed_html,
        }
    }
}

pub struct SongService {
    repo: Arc<dyn SongRepository>,
}

impl SongService {
    pub fn new(repo: Arc<dyn SongRepository>) -> Self {
        Self { repo }
    }

    /// Validate and store a new song. A missing language means English.
    pub async fn add(&self, request: AddSongRequest) -> Result<Song, SongServiceError> {
        let input = validate_add_request(request)?;
        let song = self.repo.create(&input).await.context("Failed to create song")?;
        tracing::info!(song_id = song.id, emotion = %song.emotion, "song added");
        Ok(song)
    }

    pub async fn delete(&self, id: i64) -> Result<(), SongServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete song")? {
            return Err(SongServiceError::NotFound);
        }
        tracing::info!(song_id = id, "song deleted");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Song>, SongServiceError> {
        Ok(self.repo.get_by_id(id).await.context("Failed to get song")?)
    }

    /// Catalogue keyed by mood, each group ordered by title.
    /// Moods without songs are left out.
    pub async fn grouped_by_emotion(&self) -> Result<BTreeMap<String, Vec<SongView>>, SongServiceError> {
        let songs = self.repo.list_all().await.context("Failed to list songs")?;
        let mut groups: BTreeMap<String, Vec<SongView>> = BTreeMap::new();
        for song in songs {
            groups
                .entry(song.emotion.as_str().to_string())
                .or_default()
                .push(song.into());
        }
        Ok(groups)
    }

    pub async fn count(&self) -> Result<i64, SongServiceError> {
        Ok(self.repo.count().await.context("Failed to count songs")?)
    }
}

fn validate_add_request(request: AddSongRequest) -> Result<CreateSongInput, SongServiceError> {
    let title = request.title.trim();
    let artist = request.artist.trim();
    let url = request.url.trim();
    let emotion = request.emotion.trim();

    if title.is_empty() || artist.is_empty() || url.is_empty() || emotion.is_empty() {
        return Err(SongServiceError::ValidationError(
            "All fields are required".to_string(),
        ));
    }
    if title.chars().count() > MAX_FIELD_LENGTH || artist.chars().count() > MAX_FIELD_LENGTH {
        return Err(SongServiceError::ValidationError(
            "Title and artist must be at most 255 characters".to_string(),
        ));
    }
    if url.len() > MAX_URL_LENGTH || !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SongServiceError::ValidationError(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let emotion = Emotion::from_str(emotion)
        .map_err(|_| SongServiceError::ValidationError(format!("Unknown emotion: {}", emotion)))?;
    let language = match request.language.as_deref().map(str::trim) {
        None | Some("") => Language::English,
        Some(raw) => Language::from_str(raw)
            .map_err(|_| SongServiceError::ValidationError(format!("Unknown language: {}", raw)))?,
    };

    Ok(CreateSongInput {
        title: title.to_string(),
        artist: artist.to_string(),
        url: url.to_string(),
        emotion,
        language,
    })
}

/// Player markup for a song link.
///
/// YouTube links become an embed iframe, Spotify track links a Spotify
/// embed, anything else a plain link opening in a new tab.
pub fn embedded_player(url: &str) -> String {
    if url.contains("youtube.com") || url.contains("youtu.be") {
        if let Some(id) = youtube_video_id(url) {
            return format!(
                r#"<iframe width="100%" height="315" src="https://www.youtube.com/embed/{}" frameborder="0" allow="accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture" allowfullscreen></iframe>"#,
                id
            );
        }
    } else if let Some(caps) = SPOTIFY_TRACK_RE.captures(url) {
        return format!(
            r#"<iframe src="https://open.spotify.com/embed/track/{}" width="100%" height="80" frameborder="0" allowtransparency="true" allow="encrypted-media"></iframe>"#,
            &caps[1]
        );
    }

    format!(
        r#"<a href="{}" target="_blank" rel="noopener">Open in new tab</a>"#,
        tera::escape_html(url)
    )
}

fn youtube_video_id(url: &str) -> Option<&str> {
    let id = match url.split_once("watch?v=") {
        Some((_, rest)) => rest.split('&').next()?,
        None => url.trim_end_matches('/').rsplit('/').next()?,
    };
    let id = id.split(['?', '#']).next()?;
    YOUTUBE_ID_RE.is_match(id).then_some(id)
}
