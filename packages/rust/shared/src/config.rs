//! Application configuration for lexsync.
//!
//! User config lives at `~/.lexsync/lexsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LexsyncError, Result};
use crate::types::DEFAULT_LANGUAGE;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lexsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lexsync";

/// Environment flag that turns on per-word validation warning logs.
pub const VERBOSE_WARNINGS_ENV: &str = "LEXSYNC_VERBOSE_WARNINGS";

/// Built-in loader names in default precedence order (earlier wins).
pub const DEFAULT_LOADER_ORDER: [&str; 5] = [
    "curated-jsonl",
    "manual-csv",
    "canonical-csv",
    "community",
    "enrichment",
];

// ---------------------------------------------------------------------------
// Config structs (matching lexsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pipeline behavior.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Source loader precedence.
    #[serde(default)]
    pub loaders: LoadersConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root of the raw source files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Where audit snapshots and content packs are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Language code stamped on every lexeme.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            output_dir: default_output_dir(),
            language: default_language(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_database_path() -> String {
    "var/lexsync.db".into()
}
fn default_output_dir() -> String {
    "var/out".into()
}
fn default_language() -> String {
    DEFAULT_LANGUAGE.into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Rows per persistence batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Revision tag stamped on generated inflections.
    #[serde(default = "default_source_revision")]
    pub source_revision: String,

    /// Write the aggregated-words CSV audit snapshot.
    #[serde(default = "default_true")]
    pub write_audit_snapshot: bool,

    /// Write versioned content pack files.
    #[serde(default = "default_true")]
    pub write_packs: bool,

    /// Drop words that are not on the canonical list.
    #[serde(default)]
    pub restrict_to_canonical: bool,

    /// Log every validation warning (also `LEXSYNC_VERBOSE_WARNINGS`).
    #[serde(default)]
    pub verbose_warnings: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            source_revision: default_source_revision(),
            write_audit_snapshot: true,
            write_packs: true,
            restrict_to_canonical: false,
            verbose_warnings: false,
        }
    }
}

fn default_batch_size() -> usize {
    500
}
fn default_source_revision() -> String {
    "seed-v1".into()
}
fn default_true() -> bool {
    true
}

/// `[loaders]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadersConfig {
    /// Loader names in merge precedence order.
    #[serde(default = "default_loader_order")]
    pub order: Vec<String>,
}

impl Default for LoadersConfig {
    fn default() -> Self {
        Self {
            order: default_loader_order(),
        }
    }
}

fn default_loader_order() -> Vec<String> {
    DEFAULT_LOADER_ORDER.iter().map(|s| (*s).to_string()).collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lexsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LexsyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lexsync/lexsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LexsyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LexsyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LexsyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LexsyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LexsyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.pipeline.batch_size == 0 {
        return Err(LexsyncError::config("pipeline.batch_size must be at least 1"));
    }
    if config.defaults.language.trim().is_empty() {
        return Err(LexsyncError::config("defaults.language must not be empty"));
    }
    if config.loaders.order.is_empty() {
        return Err(LexsyncError::config("loaders.order must name at least one loader"));
    }
    Ok(())
}

/// Whether the verbose-warnings environment flag is set to a truthy value.
pub fn verbose_warnings_from_env() -> bool {
    std::env::var(VERBOSE_WARNINGS_ENV)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
