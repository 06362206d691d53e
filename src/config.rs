//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$RYUSYNC_CONFIG` (environment variable)
//! 2. `~/.config/ryusync/config.toml` (Linux/macOS)
//!    `%APPDATA%\ryusync\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override individual values after loading.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::archive::backup::DEFAULT_RETENTION;
use crate::sync::policy::PriorityMode;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Emulator and tool locations.
    pub paths: PathsConfig,
    /// Save sync defaults.
    pub sync: SyncConfig,
    /// Save archive handling.
    pub archive: ArchiveConfig,
    /// External metadata extractor.
    pub extractor: ExtractorConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Emulator and tool locations. Unset paths must be given on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Ryujinx filesystem folder.
    pub ryujinx_dir: Option<PathBuf>,
    /// yuzu user folder.
    pub yuzu_dir: Option<PathBuf>,
    /// Folder holding update and DLC packages.
    pub nsp_dir: Option<PathBuf>,
    /// `hactoolnet` executable.
    pub hactoolnet: Option<PathBuf>,
    /// `prod.keys` file.
    pub prod_keys: Option<PathBuf>,
    /// titledb `versions.json`.
    pub versions_json: Option<PathBuf>,
    /// Where save trees are copied before being overwritten.
    pub backup_dir: Option<PathBuf>,
}

/// Save sync defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// "yuzu", "ryujinx" or "newer".
    pub priority: PriorityMode,
    /// Report decisions without copying.
    pub simulate: bool,
    /// Add archive entries for titles only yuzu knows.
    pub synthesize_entries: bool,
}

/// Save archive handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Number of archive backups kept.
    pub backup_retention: usize,
}

/// External metadata extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Seconds before a running extractor is killed.
    pub timeout_secs: u64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            priority: PriorityMode::Newest,
            simulate: false,
            synthesize_entries: true,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backup_retention: DEFAULT_RETENTION,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("RYUSYNC_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("ryusync").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ryusync")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("ryusync.log")
}

/// Root for save-tree backups: configured, else `<data dir>/ryusync/save-backups`.
pub fn backup_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.paths.backup_dir {
        return dir.clone();
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ryusync")
        .join("save-backups")
}
