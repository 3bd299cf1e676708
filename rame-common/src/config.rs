//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file. Every section is optional and
//! falls back to built-in defaults; a missing or broken file is logged and
//! ignored rather than aborting startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "RAME_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "RAME_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "rame.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Folder holding the database (optional; resolved when absent)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Identity reported as cluster controller
    #[serde(default)]
    pub node_name: Option<String>,

    /// Storages exposed as top-level lists
    #[serde(default)]
    pub storages: Vec<StorageConfig>,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            bind: default_bind(),
            node_name: None,
            storages: Vec::new(),
            scan: ScanConfig::default(),
            cluster: ClusterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// A named storage root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Storage name; also the id of its top-level list
    pub name: String,
    /// Display title (defaults to the name)
    #[serde(default)]
    pub title: Option<String>,
    /// Filesystem root of the storage
    pub path: PathBuf,
}

impl StorageConfig {
    /// Parse a `name=/path` command-line value
    pub fn parse_cli(value: &str) -> Result<Self> {
        let (name, path) = value
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("Expected name=/path, got '{}'", value)))?;
        let name = name.trim();
        if name.is_empty() || path.trim().is_empty() {
            return Err(Error::Config(format!("Expected name=/path, got '{}'", value)));
        }
        Ok(Self {
            name: name.to_string(),
            title: None,
            path: PathBuf::from(path.trim()),
        })
    }

    /// Title shown for the storage list
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

/// When items whose probe failed are probed again
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReprobePolicy {
    /// Every read of a list retries its failed items
    #[default]
    OnRead,
    /// Failed items are retried only by an explicit rescan
    Explicit,
}

/// Scan scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanConfig {
    /// Maximum concurrent probes per scan job
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,

    /// Per-item probe timeout
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default)]
    pub reprobe: ReprobePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_scan_concurrency(),
            probe_timeout_ms: default_probe_timeout_ms(),
            reprobe: ReprobePolicy::default(),
        }
    }
}

/// Cluster bookkeeping settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// How long cluster info stays visible after the last interest signal
    #[serde(default = "default_cluster_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cluster_ttl_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_scan_concurrency() -> usize {
    4
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_cluster_ttl_ms() -> u64 {
    3_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break startup
    pub fn validate(&self) -> Result<()> {
        if self.scan.concurrency == 0 {
            return Err(Error::Config("scan.concurrency must be at least 1".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for storage in &self.storages {
            if storage.name.trim().is_empty() {
                return Err(Error::Config("storage name must not be empty".to_string()));
            }
            if storage.name == crate::model::ROOT_LIST_ID {
                return Err(Error::Config("storage name 'root' is reserved".to_string()));
            }
            if !seen.insert(storage.name.as_str()) {
                return Err(Error::Config(format!("duplicate storage '{}'", storage.name)));
            }
        }
        Ok(())
    }

    /// Add or replace a storage by name
    pub fn upsert_storage(&mut self, storage: StorageConfig) {
        match self.storages.iter_mut().find(|s| s.name == storage.name) {
            Some(existing) => *existing = storage,
            None => self.storages.push(storage),
        }
    }
}

/// Load configuration with graceful degradation
///
/// A missing file yields defaults with an info log; an unreadable or invalid
/// file yields defaults with a warning.
pub fn load_toml_config(path: &Path) -> TomlConfig {
    if !path.exists() {
        info!("Config file {} not found, using defaults", path.display());
        return TomlConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match TomlConfig::from_toml_str(&content) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config {}: {}", path.display(), e);
                TomlConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Config file path resolution:
/// 1. Command-line argument (highest priority)
/// 2. `RAME_CONFIG` environment variable
/// 3. OS-dependent default (`~/.config/rame/rame.toml`)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::config_dir()
        .map(|d| d.join("rame").join("rame.toml"))
        .unwrap_or_else(|| PathBuf::from("/etc/rame/rame.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `RAME_ROOT_FOLDER` environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("rame"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rame"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("rame"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/rame"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rame"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rame"))
    } else {
        PathBuf::from("./rame_data")
    }
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}
