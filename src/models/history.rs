//! Listening and detection history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Emotion;

/// One history row: a detection (no song) or a song picked for a mood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub emotion: Emotion,
    pub song_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// History row joined with its song, if the song still exists.
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: i64,
    pub emotion: Emotion,
    pub song_id: Option<i64>,
    pub song_title: Option<String>,
    pub song_artist: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A page of results plus whether another page follows.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityPage {
    pub activities: Vec<Activity>,
    pub has_more: bool,
}

/// Pagination parameters, 1-based.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_clamping() {
        let p = PageRequest::new(None, None);
        assert_eq!((p.page, p.limit, p.offset()), (1, 10, 0));

        let p = PageRequest::new(Some(0), Some(1000));
        assert_eq!((p.page, p.limit), (1, PageRequest::MAX_LIMIT));

        let p = PageRequest::new(Some(3), Some(20));
        assert_eq!(p.offset(), 40);
    }
}
