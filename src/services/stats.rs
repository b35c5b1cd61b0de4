//! Admin dashboard counters

use crate::db::repositories::{HistoryRepository, SessionRepository, SongRepository, UserRepository};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub user_count: i64,
    pub song_count: i64,
    pub detection_count: i64,
    pub active_sessions: i64,
}

pub struct StatsService {
    users: Arc<dyn UserRepository>,
    songs: Arc<dyn SongRepository>,
    history: Arc<dyn HistoryRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl StatsService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        songs: Arc<dyn SongRepository>,
        history: Arc<dyn HistoryRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            users,
            songs,
            history,
            sessions,
        }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        Ok(DashboardStats {
            user_count: self.users.count().await.context("Failed to count users")?,
            song_count: self.songs.count().await.context("Failed to count songs")?,
            detection_count: self
                .history
                .count_detections()
                .await
                .context("Failed to count detections")?,
            active_sessions: self
                .sessions
                .count_active()
                .await
                .context("Failed to count sessions")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::testing::{insert_user, setup_pool};
    use crate::db::repositories::{
        SqlxHistoryRepository, SqlxSessionRepository, SqlxSongRepository, SqlxUserRepository,
    };
    use crate::models::{Emotion, Session};

    #[tokio::test]
    async fn test_dashboard_counts() {
        let pool = setup_pool().await;
        let stats = StatsService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSongRepository::boxed(pool.clone()),
            SqlxHistoryRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        assert_eq!(
            stats.dashboard().await.unwrap(),
            DashboardStats {
                user_count: 0,
                song_count: 0,
                detection_count: 0,
                active_sessions: 0
            }
        );

        let a = insert_user(&pool, "a").await;
        insert_user(&pool, "b").await;
        let history = SqlxHistoryRepository::new(pool.clone());
        history.append(a, Emotion::Happy, None).await.unwrap();
        history.append(a, Emotion::Sad, None).await.unwrap();
        SqlxSessionRepository::new(pool.clone())
            .create(&Session::start(a, chrono::Duration::minutes(30)))
            .await
            .unwrap();

        let snapshot = stats.dashboard().await.unwrap();
        assert_eq!(snapshot.user_count, 2);
        assert_eq!(snapshot.detection_count, 2);
        assert_eq!(snapshot.active_sessions, 1);
    }
}
