use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use papyrus_core::{
    load_config, validate_config, Assembler, Catalog, Fetcher, Governor, HttpCatalog,
    HttpFetcher, JobOrchestrator, JobTier, MemoryTier, Reaper, RemoteKvTier, RetryPolicy,
    SqliteTier, TieredJobStore,
};

use papyrus_server::api::create_router;
use papyrus_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PAPYRUS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Catalog endpoint: {}", config.catalog.base_url);
    info!("Staging directory: {:?}", config.download.staging_dir);

    // Store tiers: fast in-process map, optional durable KV service,
    // SQLite fallback.
    let fast = Arc::new(MemoryTier::new()) as Arc<dyn JobTier>;
    let durable = match &config.store.durable_url {
        Some(url) => {
            info!("Durable store tier: {}", url);
            Some(Arc::new(RemoteKvTier::new(
                url,
                config.store.durable_token.clone(),
                config.store.durable_timeout_secs,
            )) as Arc<dyn JobTier>)
        }
        None => {
            info!("No durable store tier configured, using fallback tier only");
            None
        }
    };
    let fallback = Arc::new(
        SqliteTier::new(&config.store.fallback_path)
            .context("Failed to open fallback store")?,
    ) as Arc<dyn JobTier>;
    let store = Arc::new(TieredJobStore::new(fast, durable, fallback));

    // Download engine
    tokio::fs::create_dir_all(&config.download.staging_dir)
        .await
        .context("Failed to create staging directory")?;
    let catalog = Arc::new(HttpCatalog::new(&config.catalog)) as Arc<dyn Catalog>;
    let fetcher = Arc::new(HttpFetcher::new(
        Duration::from_secs(config.download.attempt_timeout_secs),
        RetryPolicy {
            max_attempts: config.download.max_attempts,
            ..RetryPolicy::default()
        },
    )) as Arc<dyn Fetcher>;
    let governor = Arc::new(Governor::new(
        config.download.max_concurrent,
        Duration::from_millis(config.download.request_spacing_ms),
    ));
    let assembler = Arc::new(Assembler::new(&config.download.staging_dir));

    // Reaper
    let reaper = Arc::new(Reaper::new(
        Arc::clone(&store),
        Arc::clone(&assembler),
        &config.reaper,
    ));
    reaper.start();

    // Orchestrator
    let orchestrator = Arc::new(
        JobOrchestrator::new(store, catalog, fetcher, governor, assembler)
            .with_reaper(Arc::clone(&reaper)),
    );

    // HTTP server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, orchestrator));
    let router = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down");
    reaper.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
