use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use smartsort::ai::CredentialManager;
use smartsort::config::ConfigStore;
use smartsort::services::EventCoordinator;
use smartsort::sorter::{NamingPolicy, Pipeline, SortStats};
use smartsort::RENAMER_PROVIDER;

#[derive(Parser, Debug)]
#[command(name = "smartsort")]
#[command(about = "Watches download folders and files new arrivals into an organized vault", long_about = None)]
struct Cli {
    /// Path to config.json (defaults to the platform config directory)
    #[arg(long, env = "SMARTSORT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch and sort until interrupted (default)
    Run,
    /// Sort the files currently in the watch directories, then exit
    Cleanup,
    /// Store the renamer API key in the system keychain
    SetKey { key: String },
    /// Remove the renamer API key from the system keychain
    DeleteKey,
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() {
    smartsort::init_logging();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn open_store(path: Option<PathBuf>) -> Result<Arc<ConfigStore>, String> {
    let path = match path {
        Some(path) => path,
        None => ConfigStore::default_path().map_err(|e| e.to_string())?,
    };
    Ok(Arc::new(ConfigStore::open(path)))
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => smartsort::run(open_store(cli.config)?).await,
        Commands::Cleanup => {
            let store = open_store(cli.config)?;
            let config = store.snapshot();
            let pipeline = Arc::new(Pipeline::new(
                NamingPolicy::new(smartsort::build_renamer(&config)),
                Arc::new(SortStats::new()),
            ));
            let outcomes = EventCoordinator::new(store, Arc::clone(&pipeline))
                .startup_cleanup(&config.watch_dirs)
                .await;
            let stats = pipeline.stats().snapshot();
            tracing::info!(
                files = outcomes.len(),
                sorted = stats.files_sorted,
                failed = stats.files_failed,
                skipped = stats.files_skipped,
                "Cleanup finished"
            );
            Ok(())
        }
        Commands::SetKey { key } => CredentialManager::store_api_key(RENAMER_PROVIDER, &key),
        Commands::DeleteKey => CredentialManager::delete_api_key(RENAMER_PROVIDER),
        Commands::ShowConfig => {
            let mut config = (*open_store(cli.config)?.snapshot()).clone();
            if config.external_renamer_credential.is_some() {
                config.external_renamer_credential = Some("<redacted>".to_string());
            }
            let json = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
            println!("{}", json);
            Ok(())
        }
    }
}
