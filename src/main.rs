use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hailr::config::Config;
use hailr::db::PricingSettings;
use hailr::dispatch::spawn_sweeper;
use hailr::AppState;

#[derive(Parser, Debug)]
#[command(name = "hailr")]
#[command(author, version, about = "A fast, lightweight ride-hailing coordination server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "hailr.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hailr v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = hailr::db::init(&config.server.data_dir).await?;

    // Ensure an admin account exists
    hailr::api::auth::ensure_admin_user(
        &db,
        &config.auth.admin_email,
        config.auth.admin_password.as_deref(),
    )
    .await?;

    // Load fare configuration into the in-process cache
    let pricing = PricingSettings::load(&db).await?;

    // Install metrics recorder
    let metrics_handle = hailr::api::metrics::init_metrics();

    // Create app state
    let state = Arc::new(
        AppState::new(config.clone(), db.clone(), pricing).with_metrics(metrics_handle),
    );

    // Start the dispatch sweeper (ride expiry + stale presence)
    spawn_sweeper(db.clone(), state.lifecycle.clone(), config.dispatch.clone());

    // Create API router
    let app = hailr::api::create_router(state.clone())
        .into_make_service_with_connect_info::<SocketAddr>();

    // Start API server
    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);
    tracing::info!("Admin token: {}", config.auth.admin_token);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping server");
}
