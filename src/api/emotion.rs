//! Emotion detection and recommendation endpoints
//!
//! - POST /process_emotion - detect the mood in a snapshot, recommend songs
//! - GET /get_songs/{emotion} - songs for a mood, filtered by the caller's languages
//! - POST /save_song_selection - remember which song was played for a mood
//! - GET /video_feed - annotated MJPEG stream from the server camera

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::extract::ApiJson;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::Emotion;
use crate::services::{DetectionReport, SongView};

/// Multipart boundary of the live stream
pub const STREAM_BOUNDARY: &str = "frame";

/// Build the detection router. `max_image_bytes` sizes the request body
/// limit so oversized images reach the pipeline's own size check.
pub fn router(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/process_emotion",
            post(process_emotion).layer(DefaultBodyLimit::max(json_body_limit(max_image_bytes))),
        )
        .route("/get_songs/{emotion}", get(get_songs))
        .route("/save_song_selection", post(save_song_selection))
        .route("/video_feed", get(video_feed))
}

/// Room for the base64 expansion of an image one chunk over the limit
pub fn json_body_limit(max_image_bytes: usize) -> usize {
    (max_image_bytes + 1024 * 1024) / 3 * 4 + 4096
}

#[derive(Debug, Deserialize)]
pub struct ProcessEmotionRequest {
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessEmotionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: DetectionReport,
}

/// POST /process_emotion
async fn process_emotion(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<ProcessEmotionRequest>,
) -> Result<Json<ProcessEmotionResponse>, ApiError> {
    if body.image.trim().is_empty() {
        return Err(ApiError::validation_error("No image provided"));
    }

    let report = state.detection_service.process(user.id, body.image).await?;
    Ok(Json(ProcessEmotionResponse {
        success: true,
        report,
    }))
}

#[derive(Debug, Serialize)]
pub struct SongsResponse {
    pub success: bool,
    pub emotion: Emotion,
    pub songs: Vec<SongView>,
}

/// GET /get_songs/{emotion}
async fn get_songs(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(emotion): Path<String>,
) -> Result<Json<SongsResponse>, ApiError> {
    let emotion = Emotion::from_str(&emotion)
        .map_err(|_| ApiError::validation_error(format!("Unknown emotion: {}", emotion)))?;

    let songs = state
        .recommendation_service
        .recommend(emotion, Some(user.id))
        .await
        .map_err(ApiError::internal_error)?;

    Ok(Json(SongsResponse {
        success: true,
        emotion,
        songs: songs.into_iter().map(SongView::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SongSelectionRequest {
    #[serde(default)]
    pub emotion: String,
    pub song_id: i64,
}

/// POST /save_song_selection
async fn save_song_selection(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<SongSelectionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .history_service
        .record_selection(user.id, &body.emotion, body.song_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// One part of the `multipart/x-mixed-replace` stream
pub fn multipart_frame(jpeg: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        STREAM_BOUNDARY,
        jpeg.len()
    );
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

fn mjpeg_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", STREAM_BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache, no-store".to_string()),
        ],
        body,
    )
        .into_response()
}

/// GET /video_feed
///
/// The capture device is opened per stream and released when the client
/// disconnects.
#[cfg(feature = "camera")]
async fn video_feed(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    use crate::emotion::camera;

    let device = state.config.detection.camera_device.clone();
    let pipeline = state.detection_service.pipeline().clone();
    let mut frames = camera::start(device, pipeline).await.map_err(|e| {
        tracing::warn!(user_id = user.id, error = %e, "camera unavailable");
        ApiError::service_unavailable("Camera is not available")
    })?;

    tracing::info!(user_id = user.id, "live stream started");
    let stream = async_stream::stream! {
        while let Some(jpeg) = frames.recv().await {
            yield Ok::<_, std::convert::Infallible>(multipart_frame(&jpeg));
        }
    };
    Ok(mjpeg_response(Body::from_stream(stream)))
}

/// GET /video_feed - this build has no camera support
#[cfg(not(feature = "camera"))]
async fn video_feed() -> Result<Response, ApiError> {
    Err(ApiError::service_unavailable(
        "Camera streaming is not available",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_frame_layout() {
        let part = multipart_frame(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']));
    }

    #[test]
    fn test_mjpeg_headers() {
        let response = mjpeg_response(Body::empty());
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
    }

    #[test]
    fn test_body_limit_covers_base64_of_oversized_image() {
        let max = 5 * 1024 * 1024;
        let encoded_over_limit = (max + 1) * 4 / 3 + 64;
        assert!(json_body_limit(max) > encoded_over_limit);
    }
}
