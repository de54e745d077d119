//! Configuration for the search engine and CLI
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/maktaba/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod search;
mod serialization;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use search::{FileSearch, FileToc, SearchConfig, TocConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_LIBRARY_DIR: &str = "MAKTABA_LIBRARY_DIR";
pub const ENV_POOL_SIZE: &str = "MAKTABA_POOL_SIZE";
pub const ENV_BATCH_SIZE: &str = "MAKTABA_BATCH_SIZE";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding `catalog.sqlite` and the shard files
    pub library_dir: PathBuf,

    pub search: SearchConfig,

    pub toc: TocConfig,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("./library"),
            search: SearchConfig::default(),
            toc: TocConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub library_dir: Option<String>,

    /// Optional [search] section
    pub search: Option<FileSearch>,

    /// Optional [toc] section
    pub toc: Option<FileToc>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/maktaba/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("maktaba").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Parse a config file; a missing file yields the empty layer
    ///
    /// # Errors
    /// A file that exists but cannot be read or parsed is an error rather
    /// than a silent fallback to defaults.
    pub(crate) fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Cannot read configuration file {}", path.display()))
            }
        }
    }

    /// Load configuration: env vars > file > defaults
    pub fn load() -> anyhow::Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::read_file_config(&path)?,
            None => FileConfig::default(),
        };
        Ok(Self::from_layers(file, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file layer with an environment lookup
    pub(crate) fn from_layers(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        // Library directory: env > file > default
        let library_dir = env(ENV_LIBRARY_DIR)
            .or(file.library_dir)
            .map(PathBuf::from)
            .unwrap_or(defaults.library_dir);

        let mut search = SearchConfig::from_file(file.search);

        // Pool and batch sizes: env > file > default; unparsable env values are ignored
        if let Some(n) = env(ENV_POOL_SIZE).and_then(|v| v.trim().parse::<usize>().ok()) {
            search.pool_size = n.max(1);
        }
        if let Some(n) = env(ENV_BATCH_SIZE).and_then(|v| v.trim().parse::<usize>().ok()) {
            search.batch_size = n.max(1);
        }

        Self {
            library_dir,
            search,
            toc: TocConfig::from_file(file.toc),
            logging: LoggingConfig::from_file(file.logging),
        }
    }
}
