//! Admin API endpoints
//!
//! - POST /admin/add_song - add a song to the catalog
//! - DELETE /admin/delete_song/{id} - remove a song
//! - GET /admin/get_dashboard_stats - counters polled by the dashboard
//! - GET /admin/songs_data - the catalog grouped by emotion

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::extract::ApiJson;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::services::{AddSongRequest, DashboardStats, SongView};

/// Build the admin API router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/add_song", post(add_song))
        .route("/admin/delete_song/{id}", delete(delete_song))
        .route("/admin/get_dashboard_stats", get(get_dashboard_stats))
        .route("/admin/songs_data", get(songs_data))
}

/// Catalog counters plus server request stats
#[derive(Debug, Serialize)]
pub struct DashboardSnapshot {
    #[serde(flatten)]
    pub stats: DashboardStats,
    pub total_requests: u64,
    pub avg_response_ms: f64,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
}

pub async fn dashboard_snapshot(state: &AppState) -> anyhow::Result<DashboardSnapshot> {
    let stats = state.stats_service.dashboard().await?;
    let uptime_seconds = state.request_stats.uptime_seconds();
    Ok(DashboardSnapshot {
        stats,
        total_requests: state.request_stats.total_requests(),
        avg_response_ms: state.request_stats.avg_response_time_ms(),
        uptime_seconds,
        uptime_formatted: format_uptime(uptime_seconds),
    })
}

/// Format uptime to human readable string
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

#[derive(Debug, Serialize)]
pub struct AddSongResponse {
    pub success: bool,
    pub song_id: i64,
}

/// POST /admin/add_song
async fn add_song(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(admin)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<AddSongRequest>,
) -> Result<Json<AddSongResponse>, ApiError> {
    let song = state.song_service.add(body).await?;
    tracing::info!(admin = %admin.username, song_id = song.id, title = %song.title, "song added");
    Ok(Json(AddSongResponse {
        success: true,
        song_id: song.id,
    }))
}

/// DELETE /admin/delete_song/{id}
async fn delete_song(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(admin)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.song_service.delete(id).await?;
    tracing::info!(admin = %admin.username, song_id = id, "song deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: DashboardSnapshot,
}

/// GET /admin/get_dashboard_stats
async fn get_dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let snapshot = dashboard_snapshot(&state)
        .await
        .map_err(ApiError::internal_error)?;
    Ok(Json(DashboardResponse {
        success: true,
        snapshot,
    }))
}

#[derive(Debug, Serialize)]
pub struct SongsDataResponse {
    pub success: bool,
    pub songs: BTreeMap<String, Vec<SongView>>,
}

/// GET /admin/songs_data
async fn songs_data(State(state): State<AppState>) -> Result<Json<SongsDataResponse>, ApiError> {
    let songs = state.song_service.grouped_by_emotion().await?;
    Ok(Json(SongsDataResponse {
        success: true,
        songs,
    }))
}
