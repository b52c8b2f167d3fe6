mod config;
mod crypto;
mod db;
mod domain;
mod error;
mod middleware;
mod state;
mod web;

use crate::config::Config;
use crate::db::seed::{self, AdminSeed};
use crate::middleware::RateLimiter;
use crate::state::{AppState, SharedState};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    let admin = config.admin.as_ref().map(|(email, password)| AdminSeed {
        name: "Administrator",
        email,
        password,
    });
    seed::seed_all(&pool, admin).await?;

    let cipher = Arc::new(crypto::PiiCipher::from_key_bytes(&config.enc_key)?);
    let shared: SharedState = Arc::new(AppState {
        pool,
        cipher,
        session_key: config.session_key.clone(),
        session_ttl: chrono::Duration::hours(config.session_ttl_hours),
        secure_cookies: config.secure_cookies,
        trust_proxy: config.trust_proxy,
        submit_limiter: RateLimiter::new(config.submit_rate_limit, config.submit_rate_window_secs),
    });

    let scheduler = JobScheduler::new().await?;

    // Analytics reconciliation - top of every hour
    let shared_for_reconcile = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_reconcile.clone();
            Box::pin(async move {
                match db::reconcile_all_analytics(&state.pool).await {
                    Ok(0) => tracing::debug!("Analytics reconciliation: nothing to fix"),
                    Ok(fixed) => tracing::info!("Analytics reconciliation corrected {} surveys", fixed),
                    Err(e) => tracing::error!("Analytics reconciliation failed: {}", e),
                }
            })
        })?)
        .await?;

    // Rate limiter cleanup - every 10 minutes
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 */10 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                state.submit_limiter.cleanup().await;
                web::auth::prune_login_attempts().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Analytics reconciliation: hourly");
    tracing::info!("  - Rate limiter cleanup: every 10 min");

    let app = web::app(shared);

    tracing::info!("Listening on {} (trust proxy headers: {})", config.bind_addr, config.trust_proxy);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
