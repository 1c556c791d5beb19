//! CLI argument definitions for the Jarvis application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use jarvis_core::config::StorageBackend;

/// Jarvis: conversational investigation of incidents, deployments,
/// metrics and logs.
#[derive(Parser, Debug, Default)]
#[command(name = "jarvis", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the session database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Session storage backend.
    #[arg(short = 's', long = "storage", value_parser = ["memory", "sqlite"])]
    pub storage: Option<String>,

    /// Initial sampling temperature: a preset name or a number in 0.0 - 1.0.
    #[arg(short = 't', long = "temperature")]
    pub temperature: Option<String>,

    /// Write the resolved configuration to the config path and exit.
    #[arg(long = "init-config")]
    pub init_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > JARVIS_CONFIG env var > ~/.jarvis/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("JARVIS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Returns `None` if not overridden (use the config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level. Returns `None` if not overridden.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Resolve the storage backend.
    ///
    /// Priority: --storage flag > JARVIS_STORAGE env var > config file value.
    pub fn resolve_storage(&self, config_backend: StorageBackend) -> StorageBackend {
        let env = std::env::var("JARVIS_STORAGE").ok();
        self.storage
            .as_deref()
            .or(env.as_deref())
            .and_then(parse_backend)
            .unwrap_or(config_backend)
    }
}

fn parse_backend(value: &str) -> Option<StorageBackend> {
    match value.trim().to_lowercase().as_str() {
        "memory" => Some(StorageBackend::Memory),
        "sqlite" => Some(StorageBackend::Sqlite),
        other => {
            tracing::warn!(backend = other, "Unknown storage backend ignored");
            None
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".jarvis").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".jarvis").join("config.toml");
    }
    PathBuf::from("config.toml")
}
