//! jobcast API server

use anyhow::{Context, Result};
use jobcast_api::{AppState, BroadcastHub, routes};
use jobcast_config::{SystemConfig, load_system_config};
use jobcast_db::{JobRepo, PgJobRepo, StatusStore, create_pool, run_migrations};
use jobcast_scheduler::{ChangeListener, Scheduler};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "jobcast.kdl";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;

    // Create database pool
    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    let cancel = CancellationToken::new();

    let (hub, coordinator) = BroadcastHub::new(&config.hub);
    let hub_task = tokio::spawn(coordinator.run(cancel.clone()));

    let executor = jobcast_executor::from_config(&config.executor)?;
    info!(executor = executor.name(), "Task executor ready");

    let repo = Arc::new(PgJobRepo::new(pool.clone()));
    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        executor,
        repo.clone() as Arc<dyn StatusStore>,
        Arc::new(hub.clone()),
    ));

    // Subscribe before the recovery scan so a job inserted in between is
    // still announced to the listener.
    let change_listener =
        ChangeListener::subscribe(&pool, repo.clone() as Arc<dyn JobRepo>, scheduler.clone())
            .await
            .context("Failed to subscribe to job notifications")?;

    if config.scheduler.recover_on_startup {
        scheduler
            .recover(repo.as_ref())
            .await
            .context("Failed to recover outstanding jobs")?;
    }

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let listener_task = tokio::spawn(change_listener.run(cancel.clone()));

    let state = AppState::new(pool, repo, hub);

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
    let addr = config.server.bind;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    scheduler_task.await?;
    hub_task.await?;
    listener_task.await?;

    info!("Server stopped");
    Ok(())
}

/// Read the configuration file named by `JOBCAST_CONFIG`, falling back to
/// defaults when the file does not exist. `DATABASE_URL` overrides the
/// configured database URL.
fn load_config() -> Result<SystemConfig> {
    let path =
        std::env::var("JOBCAST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = if Path::new(&path).exists() {
        load_system_config(&path)
            .with_context(|| format!("Failed to load config file: {}", path))?
    } else {
        info!(path = %path, "No config file found, using defaults");
        SystemConfig::default()
    };

    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }

    Ok(config)
}

/// Resolve on Ctrl-C or when another task cancels the token.
async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                    cancel.cancelled().await;
                }
            }
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
