mod api;
mod config;
mod db;
mod error;
mod rate;
mod report;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::rate::{RateRefresher, RateTracker};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Rate aggregator: explicit task handle, aborted on shutdown ---
    let tracker = RateTracker::new();
    let refresher = RateRefresher::new(Arc::clone(&tracker), cfg.rate_refresh_secs)?;
    let rate_task = tokio::spawn(async move { refresher.run().await });
    info!("Rate refresher started (every {}s)", cfg.rate_refresh_secs);

    // --- HTTP API server ---
    let api_state = ApiState {
        pool,
        rate: Arc::clone(&tracker),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    rate_task.abort();
    info!("Rate refresher stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
