//! API middleware
//!
//! Contains middleware for:
//! - Authentication (signed session cookie or Bearer token)
//! - Authorization (admin-only routes)
//! - Request statistics and client address resolution

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::api::responses::ApiError;
use crate::config::Config;
use crate::db::repositories::{
    SqlxHistoryRepository, SqlxLanguagePreferenceRepository, SqlxResetTokenRepository,
    SqlxSessionRepository, SqlxSongRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::emotion::EmotionPipeline;
use crate::models::User;
use crate::pages::{PageError, PageRenderer};
use crate::services::{
    DetectionService, HistoryService, LoginRateLimiter, Mailer, PreferenceService,
    RecommendationService, ResetService, Signer, SongService, StatsService, UserService,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "moodify_session";

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Sum of response times in microseconds
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64 / 1000.0
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub signer: Signer,
    pub user_service: Arc<UserService>,
    pub reset_service: Arc<ResetService>,
    pub song_service: Arc<SongService>,
    pub recommendation_service: Arc<RecommendationService>,
    pub preference_service: Arc<PreferenceService>,
    pub history_service: Arc<HistoryService>,
    pub detection_service: Arc<DetectionService>,
    pub stats_service: Arc<StatsService>,
    pub pages: Arc<PageRenderer>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(
        pool: DynDatabasePool,
        config: Config,
        pipeline: Arc<EmotionPipeline>,
        mailer: Arc<dyn Mailer>,
        signer: Signer,
    ) -> Result<Self, PageError> {
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let songs = SqlxSongRepository::boxed(pool.clone());
        let history = SqlxHistoryRepository::boxed(pool.clone());
        let preferences = SqlxLanguagePreferenceRepository::boxed(pool.clone());
        let reset_tokens = SqlxResetTokenRepository::boxed(pool.clone());

        let recommendation_service =
            Arc::new(RecommendationService::new(songs.clone(), preferences.clone()));

        Ok(Self {
            user_service: Arc::new(UserService::with_session_lifetime(
                users.clone(),
                sessions.clone(),
                config.session.lifetime_minutes,
            )),
            reset_service: Arc::new(ResetService::new(
                users.clone(),
                reset_tokens,
                mailer,
                signer.clone(),
                config.mail.public_base_url.clone(),
            )),
            song_service: Arc::new(SongService::new(songs.clone())),
            preference_service: Arc::new(PreferenceService::new(preferences.clone())),
            history_service: Arc::new(HistoryService::new(
                history.clone(),
                songs.clone(),
                preferences,
            )),
            detection_service: Arc::new(DetectionService::new(
                pipeline,
                history.clone(),
                recommendation_service.clone(),
            )),
            stats_service: Arc::new(StatsService::new(users, songs, history, sessions)),
            recommendation_service,
            pages: Arc::new(PageRenderer::new()?),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            request_stats: Arc::new(RequestStats::new()),
            config: Arc::new(config),
            signer,
            pool,
        })
    }

    /// `Set-Cookie` value for a freshly started session
    pub fn session_cookie(&self, session_id: &str) -> HeaderValue {
        let max_age = self.user_service.session_lifetime().num_seconds();
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            SESSION_COOKIE,
            self.signer.sign(session_id),
            max_age,
            self.secure_flag()
        );
        // Signed uuid and base64url only
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_session_cookie(&self) -> HeaderValue {
        let cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            SESSION_COOKIE,
            self.secure_flag()
        );
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    fn secure_flag(&self) -> &'static str {
        if self.config.session.cookie_secure {
            "; Secure"
        } else {
            ""
        }
    }

    /// Session id from a correctly signed cookie or Bearer token
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        let token = extract_session_token(headers)?;
        self.signer.verify(&token).map(str::to_string)
    }

    /// The signed-in user, if any. Lookup failures count as signed out.
    pub async fn current_user(&self, headers: &HeaderMap) -> Option<User> {
        let session_id = self.session_id(headers)?;
        match self.user_service.validate_session(&session_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed");
                None
            }
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Best-known client address, set by `client_ip_middleware`
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

/// Extract the signed session value from the request.
/// A Bearer token takes priority over the cookie.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    if name == SESSION_COOKIE && !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    None
}

// ============================================================================
// Authentication
// ============================================================================

/// Authentication middleware for JSON endpoints
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = state
        .current_user(request.headers())
        .await
        .ok_or_else(|| ApiError::unauthorized("Please log in to continue"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Authentication middleware for pages: redirects to the login form
pub async fn require_login_page(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.current_user(request.headers()).await {
        Some(user) => {
            request.extensions_mut().insert(AuthenticatedUser(user));
            next.run(request).await
        }
        None => Redirect::to("/login").into_response(),
    }
}

/// Admin authorization middleware for JSON endpoints
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Please log in to continue"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Unauthorized"));
    }

    Ok(next.run(request).await)
}

/// Admin authorization middleware for pages
pub async fn require_admin_page(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(AuthenticatedUser(user)) = request.extensions().get::<AuthenticatedUser>().cloned() else {
        return Redirect::to("/login").into_response();
    };

    if !user.is_admin() {
        let mut ctx = crate::api::pages::page_context(Some(&user));
        ctx.insert("message", "You do not have access to this page.");
        let html = state.pages.render_with_fallback("error.html", &ctx);
        return (StatusCode::FORBIDDEN, Html(html)).into_response();
    }

    next.run(request).await
}

// ============================================================================
// Request bookkeeping
// ============================================================================

/// Request statistics middleware
///
/// Records request count and response time for the admin dashboard.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

/// Resolve the client address from proxy headers or the socket peer
pub async fn client_ip_middleware(mut request: Request, next: Next) -> Response {
    let ip = forwarded_ip(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    });
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        // First hop is the original client
        if let Some(ip) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}
