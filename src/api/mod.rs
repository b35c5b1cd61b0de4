//! API layer - HTTP handlers and routing
//!
//! - Auth form flows (login, signup, logout, password reset)
//! - Server-rendered pages for users and admins
//! - JSON endpoints for detection, recommendations and account management
//! - Admin JSON endpoints for the song catalog and dashboard
//! - Embedded static assets

pub mod account;
pub mod admin;
pub mod auth;
pub mod emotion;
pub mod extract;
pub mod middleware;
pub mod pages;
pub mod responses;
pub mod static_files;

#[cfg(test)]
mod tests;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{AppState, RequestStats};
pub use responses::ApiError;

/// Routes that need a signed-in user
fn user_routes(state: &AppState) -> Router<AppState> {
    let max_image_bytes = state.config.detection.max_image_bytes;

    let api = Router::new()
        .merge(emotion::router(max_image_bytes))
        .merge(account::router(max_image_bytes))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let pages = pages::user_router().route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::require_login_page,
    ));

    api.merge(pages)
}

/// Routes that need an admin
fn admin_routes(state: &AppState) -> Router<AppState> {
    let api = admin::router()
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let pages = pages::admin_router()
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin_page,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_login_page,
        ));

    api.merge(pages)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %cors_origin, "invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(pages::root))
        .route("/static/{*path}", get(static_files::serve_static))
        .merge(auth::router())
        .merge(user_routes(&state))
        .merge(admin_routes(&state))
        .layer(cors_layer(cors_origin))
        .layer(axum_middleware::from_fn(middleware::client_ip_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}
