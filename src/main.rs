mod auth;
mod booking;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod routes;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    db::{OutboxNotifier, PgBookingStore},
    models::AppState,
    scheduler::TaskRegistry,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;

    if let Some((username, password)) = &cfg.bootstrap_staff {
        db::ensure_staff_account(&pool, username, password).await?;
    }
    tokio::fs::create_dir_all(&cfg.upload_dir).await?;

    let mut tasks = TaskRegistry::new();
    scheduler::spawn_reminder_sweep(
        &mut tasks,
        Arc::new(PgBookingStore::new(pool.clone())),
        Arc::new(OutboxNotifier::new(pool.clone(), cfg.clinic_name.clone())),
        Duration::from_secs(cfg.reminder_interval_minutes * 60),
    );

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        upload_dir: cfg.upload_dir.clone(),
        clinic_name: cfg.clinic_name.clone(),
    };

    // Browser clients on another origin need the preflight answered.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
