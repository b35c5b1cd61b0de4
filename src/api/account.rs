//! Account endpoints for the signed-in user
//!
//! - Language preferences (save, update, get)
//! - Profile name/email, password and profile picture
//! - Activity history paging, clearing and export
//! - Account deletion

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::emotion::json_body_limit;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::emotion::preprocess::decode_payload;
use crate::models::{Activity, Language, PageRequest};

/// Attachment name of the data export
pub const EXPORT_FILENAME: &str = "moodify_user_data.json";

/// Build the account router. Avatar uploads share the detection image limit.
pub fn router(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/save_language_preferences", post(save_language_preferences))
        .route("/update_language_preferences", post(save_language_preferences))
        .route("/get_language_preferences", get(get_language_preferences))
        .route("/update_profile", post(update_profile))
        .route("/update_password", post(update_password))
        .route(
            "/update_profile_picture",
            post(update_profile_picture)
                .layer(DefaultBodyLimit::max(json_body_limit(max_image_bytes))),
        )
        .route("/profile_picture", get(profile_picture))
        .route("/download_user_data", get(download_user_data))
        .route("/get_user_activity", get(get_user_activity))
        .route("/clear_activity_history", post(clear_activity_history))
        .route("/delete_account", post(delete_account))
}

fn ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
pub struct LanguagesRequest {
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub success: bool,
    pub languages: Vec<Language>,
}

/// POST /save_language_preferences and /update_language_preferences
///
/// Replaces the stored set; an empty list clears the filter.
async fn save_language_preferences(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<LanguagesRequest>,
) -> Result<Json<LanguagesResponse>, ApiError> {
    let languages = state.preference_service.save(user.id, &body.languages).await?;
    Ok(Json(LanguagesResponse {
        success: true,
        languages,
    }))
}

/// GET /get_language_preferences
async fn get_language_preferences(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<LanguagesResponse>, ApiError> {
    let languages = state.preference_service.get(user.id).await?;
    Ok(Json(LanguagesResponse {
        success: true,
        languages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// POST /update_profile
async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .user_service
        .update_profile(user.id, &body.name, &body.email)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "name": updated.name,
        "email": updated.email,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// POST /update_password
async fn update_password(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<UpdatePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .user_service
        .change_password(user.id, &body.current_password, &body.new_password)
        .await?;
    tracing::info!(user_id = user.id, "password changed");
    Ok(ok())
}

#[derive(Debug, Deserialize)]
pub struct ProfilePictureRequest {
    #[serde(default)]
    pub image: String,
}

/// POST /update_profile_picture - accepts a data URL or bare base64
async fn update_profile_picture(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<ProfilePictureRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.image.trim().is_empty() {
        return Err(ApiError::validation_error("No image provided"));
    }
    let bytes = decode_payload(&body.image, state.config.detection.max_image_bytes)?;
    state.user_service.update_avatar(user.id, bytes).await?;
    Ok(ok())
}

/// GET /profile_picture
async fn profile_picture(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    match state.user_service.avatar(user.id).await? {
        Some(avatar) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, avatar.mime),
                (header::CACHE_CONTROL, "private, no-cache".to_string()),
            ],
            avatar.bytes,
        )
            .into_response()),
        None => Err(ApiError::not_found("No profile picture")),
    }
}

/// GET /download_user_data - everything stored about the user as a JSON file
async fn download_user_data(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    let export = state.history_service.export(user).await?;
    let body = serde_json::to_vec_pretty(&export).map_err(ApiError::internal_error)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub success: bool,
    pub activities: Vec<Activity>,
    pub has_more: bool,
}

/// GET /get_user_activity?page=2&limit=10
async fn get_user_activity(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> Result<Json<ActivityResponse>, ApiError> {
    let page = state
        .history_service
        .activity(user.id, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(ActivityResponse {
        success: true,
        activities: page.activities,
        has_more: page.has_more,
    }))
}

/// POST /clear_activity_history
async fn clear_activity_history(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.history_service.clear(user.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "removed": removed })))
}

/// POST /delete_account - removes the user with their sessions and history
async fn delete_account(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    state.user_service.delete_account(user.id).await?;
    tracing::info!(user_id = user.id, username = %user.username, "account deleted");
    Ok((
        [(header::SET_COOKIE, state.clear_session_cookie())],
        ok(),
    )
        .into_response())
}
