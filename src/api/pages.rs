//! Server-rendered app pages
//!
//! - GET / - landing redirect
//! - GET /welcome, /detect, /recommendations, /language, /profile, /settings
//! - GET /user_history
//! - GET /admin, /admin/songs (admin only)

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use std::str::FromStr;
use tera::Context as TeraContext;

use crate::api::admin::dashboard_snapshot;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::models::{Emotion, Language, PageRequest, User};
use crate::services::SongView;

/// Pages for any signed-in user (wrapped in `require_login_page`)
pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/welcome", get(welcome))
        .route("/detect", get(detect))
        .route("/recommendations", get(recommendations))
        .route("/language", get(language))
        .route("/profile", get(profile))
        .route("/settings", get(settings))
        .route("/user_history", get(user_history))
}

/// Admin pages (wrapped in `require_admin_page`)
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin_dashboard))
        .route("/admin/songs", get(admin_songs))
}

/// Base template context: the signed-in user (or null) plus empty alerts
pub fn page_context(user: Option<&User>) -> TeraContext {
    let mut ctx = TeraContext::new();
    let current_user = user.map(|u| {
        serde_json::json!({
            "id": u.id,
            "name": u.name,
            "username": u.username,
            "email": u.email,
            "is_admin": u.is_admin(),
            "has_avatar": u.has_avatar,
        })
    });
    ctx.insert("current_user", &current_user);
    ctx.insert("error", &Option::<String>::None);
    ctx.insert("notice", &Option::<String>::None);
    ctx.insert("camera_enabled", &cfg!(feature = "camera"));
    ctx
}

pub fn render(state: &AppState, template: &str, ctx: &TeraContext) -> Response {
    render_with_status(state, StatusCode::OK, template, ctx)
}

pub fn render_with_status(
    state: &AppState,
    status: StatusCode,
    template: &str,
    ctx: &TeraContext,
) -> Response {
    (status, Html(state.pages.render_with_fallback(template, ctx))).into_response()
}

/// Log `cause` and show the generic error page
pub fn error_page(state: &AppState, user: Option<&User>, cause: impl std::fmt::Display) -> Response {
    tracing::error!(error = %cause, "page handler failed");
    let mut ctx = page_context(user);
    ctx.insert("message", "Something went wrong. Please try again.");
    render_with_status(state, StatusCode::INTERNAL_SERVER_ERROR, "error.html", &ctx)
}

/// Where a user lands after logging in
pub fn landing_path(user: &User) -> &'static str {
    if user.is_admin() {
        "/admin"
    } else {
        "/welcome"
    }
}

/// GET / - send visitors to the app or the login form
pub async fn root(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    match state.current_user(&headers).await {
        Some(_) => Redirect::to("/welcome"),
        None => Redirect::to("/login"),
    }
}

async fn welcome(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    let mut ctx = page_context(Some(&user));
    ctx.insert("emotions", &Emotion::DETECTABLE);
    render(&state, "welcome.html", &ctx)
}

async fn detect(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    render(&state, "detect.html", &page_context(Some(&user)))
}

#[derive(Debug, Deserialize)]
struct RecommendationsQuery {
    emotion: Option<String>,
}

/// GET /recommendations?emotion=Happy - songs for a mood, rendered server-side.
/// Without a (valid) mood the page falls back to the last detection kept in
/// the browser.
async fn recommendations(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(query): Query<RecommendationsQuery>,
) -> Response {
    let emotion = query.emotion.as_deref().and_then(|e| Emotion::from_str(e).ok());

    let songs: Vec<SongView> = match emotion {
        Some(emotion) => match state.recommendation_service.recommend(emotion, Some(user.id)).await {
            Ok(songs) => songs.into_iter().map(SongView::from).collect(),
            Err(e) => return error_page(&state, Some(&user), e),
        },
        None => Vec::new(),
    };

    let mut ctx = page_context(Some(&user));
    ctx.insert("emotion", &emotion);
    ctx.insert("emotions", &Emotion::DETECTABLE);
    ctx.insert("songs", &songs);
    render(&state, "recommendations.html", &ctx)
}

async fn language_context(state: &AppState, user: &User) -> Result<TeraContext, Response> {
    let selected = state
        .preference_service
        .get(user.id)
        .await
        .map_err(|e| error_page(state, Some(user), e))?;
    let mut ctx = page_context(Some(user));
    ctx.insert("languages", &Language::ALL);
    ctx.insert("selected", &selected);
    Ok(ctx)
}

async fn language(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    match language_context(&state, &user).await {
        Ok(ctx) => render(&state, "language.html", &ctx),
        Err(response) => response,
    }
}

async fn settings(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    match language_context(&state, &user).await {
        Ok(ctx) => render(&state, "settings.html", &ctx),
        Err(response) => response,
    }
}

async fn profile(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    render(&state, "profile.html", &page_context(Some(&user)))
}

async fn user_history(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    let page = match state
        .history_service
        .activity(user.id, PageRequest::new(Some(1), None))
        .await
    {
        Ok(page) => page,
        Err(e) => return error_page(&state, Some(&user), e),
    };

    let mut ctx = page_context(Some(&user));
    ctx.insert("activities", &page.activities);
    ctx.insert("has_more", &page.has_more);
    render(&state, "user_history.html", &ctx)
}

async fn admin_dashboard(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    let stats = match dashboard_snapshot(&state).await {
        Ok(stats) => stats,
        Err(e) => return error_page(&state, Some(&user), e),
    };

    let mut ctx = page_context(Some(&user));
    ctx.insert("stats", &stats);
    render(&state, "admin/dashboard.html", &ctx)
}

async fn admin_songs(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Response {
    let groups = match state.song_service.grouped_by_emotion().await {
        Ok(groups) => groups,
        Err(e) => return error_page(&state, Some(&user), e),
    };

    let mut ctx = page_context(Some(&user));
    ctx.insert("groups", &groups);
    ctx.insert("emotions", &Emotion::ALL);
    ctx.insert("languages", &Language::ALL);
    render(&state, "admin/songs.html", &ctx)
}
