//! Moodify - mood-based music recommendations

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moodify::{
    api::{self, AppState},
    config::Config,
    db,
    emotion::EmotionPipeline,
    services::{Signer, SmtpMailer},
};

/// Housekeeping interval for sessions, reset tokens and rate limit buckets
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodify=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Moodify...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let signer = match config.session.secret.as_deref() {
        Some(secret) => Signer::new(secret),
        None => {
            tracing::warn!("No session secret configured, sessions will not survive a restart");
            Signer::random()
        }
    };

    // Models load on the first detection
    let pipeline = Arc::new(EmotionPipeline::from_config(&config.detection));
    let mailer = SmtpMailer::boxed(config.mail.clone());
    let cors_origin = config.server.cors_origin.clone();
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(pool, config, pipeline, mailer, signer)?;

    if state.user_service.ensure_admin(&state.config.admin).await? {
        tracing::info!(username = %state.config.admin.username, "Admin account created");
    }

    // Periodic cleanup task
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match state.user_service.cleanup_expired_sessions().await {
                    Ok(n) if n > 0 => tracing::debug!(removed = n, "expired sessions removed"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "session cleanup failed"),
                }
                match state.reset_service.cleanup().await {
                    Ok(n) if n > 0 => tracing::debug!(removed = n, "stale reset tokens removed"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "reset token cleanup failed"),
                }
                state.rate_limiter.cleanup().await;
            }
        });
    }

    let app = api::build_router(state, &cors_origin);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
