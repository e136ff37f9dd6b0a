//! Hatchway API Server

use clap::Parser;
use hatchway_api::{AppState, routes};
use hatchway_config::{DEFAULT_MAX_CONNECTIONS, StoreConfig, SystemConfig, load_system_config};
use hatchway_db::{create_pool, run_migrations};
use hatchway_scheduler::BookingReaper;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hatchway-server")]
#[command(about = "Hatchway job scheduler API server", long_about = None)]
struct Args {
    /// Path to the KDL system configuration
    #[arg(long, env = "HATCHWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(long, env = "HATCHWAY_LISTEN")]
    listen: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = match &args.config {
        Some(path) => load_system_config(path)?,
        None => SystemConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let max_connections = match config.store {
            StoreConfig::Postgres {
                max_connections, ..
            } => max_connections,
            StoreConfig::Memory => DEFAULT_MAX_CONNECTIONS,
        };
        config.store = StoreConfig::Postgres {
            url,
            max_connections,
        };
    }

    let state = match &config.store {
        StoreConfig::Memory => {
            warn!("Using in-memory store; state is lost on restart");
            AppState::in_memory(&config.booking)
        }
        StoreConfig::Postgres {
            url,
            max_connections,
        } => {
            info!("Connecting to database...");
            let pool = create_pool(url, *max_connections).await?;
            run_migrations(&pool).await?;
            info!("Database connected");
            AppState::postgres(pool, &config.booking)
        }
    };

    // Stale booking reaper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = BookingReaper::new(Arc::clone(&state.broker), config.booking.reap_interval);
    let reaper_handle = tokio::spawn(async move { reaper.run(shutdown_rx).await });

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let listener = TcpListener::bind(&config.server.listen).await?;
    info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    reaper_handle.await?;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
