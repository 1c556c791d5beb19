//! Jarvis application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialise tracing (and stop after `--init-config` writes the file)
//! 3. Open the session store (in-memory or SQLite)
//! 4. Build the reasoning engine and chat orchestrator
//! 5. Run the interactive loop

mod cli;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use jarvis_chat::{parse_temperature, ChatOrchestrator, OpenAiEngine};
use jarvis_core::config::{JarvisConfig, StorageBackend};
use jarvis_storage::{Database, MemorySessionStore, SessionRepository, SessionStore};

use cli::CliArgs;

/// Expand a leading `~` to the user's home directory.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn open_store(
    backend: StorageBackend,
    config: &JarvisConfig,
) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    match backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
        StorageBackend::Sqlite => {
            let data_dir = resolve_data_dir(&config.general.data_dir);
            let db = Database::open_in(&data_dir, &config.storage).inspect_err(|e| {
                tracing::error!(path = %data_dir.display(), error = %e, "Failed to open session database");
            })?;
            Ok(Arc::new(SessionRepository::new(Arc::new(db))))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    // An explicitly named config file must load; the default location may be absent.
    let mut config = if args.config.is_some() {
        JarvisConfig::load(&config_file)?
    } else {
        JarvisConfig::load_or_default(&config_file)
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    if let Some(ref value) = args.temperature {
        config.engine.temperature = parse_temperature(value)?;
    }

    // Tracing goes to stderr so it does not interleave with answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Jarvis v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    if args.init_config {
        config.save(&config_file)?;
        println!("Configuration written to {}", config_file.display());
        return Ok(());
    }

    let backend = args.resolve_storage(config.storage.backend);
    let store = open_store(backend, &config)?;

    let engine = Arc::new(OpenAiEngine::from_config(&config.engine));
    tracing::info!(model = %config.engine.model, base_url = %config.engine.base_url, "Reasoning engine configured");

    let mut chat = ChatOrchestrator::new(engine, store, &config);
    let session_id = chat.new_session();
    tracing::info!(session_id = %session_id, "Ready");

    repl::run(&mut chat).await?;

    tracing::info!("Jarvis stopped");
    Ok(())
}
