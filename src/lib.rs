pub mod ai;
pub mod config;
pub mod services;
pub mod sorter;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ai::{AnthropicRenamer, CredentialManager};
use config::{AppConfig, ConfigStore};
use services::{EventCoordinator, WatchService};
use sorter::{ExternalRenamer, NamingPolicy, Pipeline, SortStats};

/// Credential store key for the renamer API key
pub const RENAMER_PROVIDER: &str = "anthropic";

/// Capacity of the watcher -> coordinator channel
const EVENT_QUEUE: usize = 1024;

/// Load `.env` and install the tracing subscriber
pub fn init_logging() {
    let _ = dotenvy::dotenv();

    // Default: warn for dependencies, info for sort results
    // Use RUST_LOG=smartsort=debug for per-stage logs
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,smartsort=info")),
        )
        .try_init();
}

/// Build the external renamer when AI renaming is on and a key can be found
pub fn build_renamer(config: &AppConfig) -> Option<Arc<dyn ExternalRenamer>> {
    if !config.ai_renaming {
        return None;
    }
    match CredentialManager::resolve_api_key(config.external_renamer_credential.as_deref(), RENAMER_PROVIDER) {
        Some(key) => Some(Arc::new(AnthropicRenamer::new(key))),
        None => {
            tracing::warn!("AI renaming is enabled but no API key is configured; using local naming only");
            None
        }
    }
}

/// Run the sorter until Ctrl-C
pub async fn run(store: Arc<ConfigStore>) -> Result<(), String> {
    let config = store.snapshot();
    tracing::info!(
        config = ?store.path(),
        target = %config.target_dir.display(),
        "Starting SmartSort"
    );

    std::fs::create_dir_all(&config.target_dir)
        .map_err(|e| format!("Failed to create target directory {}: {}", config.target_dir.display(), e))?;

    let pipeline = Arc::new(Pipeline::new(
        NamingPolicy::new(build_renamer(&config)),
        Arc::new(SortStats::new()),
    ));
    let coordinator = EventCoordinator::new(Arc::clone(&store), Arc::clone(&pipeline));

    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let mut watchers = WatchService::new();
    for dir in &config.watch_dirs {
        if let Err(e) = watchers.add_folder(dir, tx.clone()) {
            tracing::warn!(folder = %dir.display(), error = %e, "Skipping watch directory");
        }
    }
    if let Err(e) = watchers.watch_config(Arc::clone(&store)) {
        tracing::warn!(error = %e, "Config hot reload unavailable");
    }
    drop(tx);

    if watchers.watched_folders().is_empty() {
        return Err("No watch directory could be opened".to_string());
    }

    if config.startup_cleanup {
        let outcomes = coordinator.startup_cleanup(&watchers.watched_folders()).await;
        tracing::info!(files = outcomes.len(), "Startup cleanup finished");
    }

    let events = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run(rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;
    tracing::info!("Shutting down");

    // Dropping the watchers closes the channel; the coordinator drains in-flight work
    drop(watchers);
    events.await.map_err(|e| format!("Coordinator task failed: {}", e))?;

    let stats = pipeline.stats().snapshot();
    tracing::info!(
        sorted = stats.files_sorted,
        failed = stats.files_failed,
        skipped = stats.files_skipped,
        "SmartSort stopped"
    );
    Ok(())
}
