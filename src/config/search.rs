//! Search and TOC tuning

use serde::Deserialize;

use crate::engine::{EngineSettings, SnippetStyle};

// ─────────────────────────────────────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────────────────────────────────────

/// Search engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Connections (and parallel windows) per shard
    pub pool_size: usize,
    /// Connections per shard for TOC lookups
    pub lookup_pool_size: u32,
    /// Rows per page inside a window
    pub batch_size: usize,
    /// Row-progress report granularity
    pub progress_every: usize,
    /// Rows decoded between stop/pause checks
    pub pause_check_every: usize,
    /// Characters kept either side of the first match in a snippet
    pub snippet_radius: usize,
    pub highlight_open: String,
    pub highlight_close: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            lookup_pool_size: 2,
            batch_size: 200,
            progress_every: 10,
            pause_check_every: 10,
            snippet_radius: 80,
            highlight_open: "<mark>".to_string(),
            highlight_close: "</mark>".to_string(),
        }
    }
}

/// Search settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileSearch {
    pub pool_size: Option<usize>,
    pub lookup_pool_size: Option<u32>,
    pub batch_size: Option<usize>,
    pub progress_every: Option<usize>,
    pub pause_check_every: Option<usize>,
    pub snippet_radius: Option<usize>,
    pub highlight_open: Option<String>,
    pub highlight_close: Option<String>,
}

impl SearchConfig {
    /// Create from file config with defaults; zero sizes are raised to one
    pub fn from_file(file: Option<FileSearch>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            pool_size: file.pool_size.unwrap_or(defaults.pool_size).max(1),
            lookup_pool_size: file
                .lookup_pool_size
                .unwrap_or(defaults.lookup_pool_size)
                .max(1),
            batch_size: file.batch_size.unwrap_or(defaults.batch_size).max(1),
            progress_every: file.progress_every.unwrap_or(defaults.progress_every).max(1),
            pause_check_every: file
                .pause_check_every
                .unwrap_or(defaults.pause_check_every)
                .max(1),
            snippet_radius: file.snippet_radius.unwrap_or(defaults.snippet_radius),
            highlight_open: file.highlight_open.unwrap_or(defaults.highlight_open),
            highlight_close: file.highlight_close.unwrap_or(defaults.highlight_close),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            progress_every: self.progress_every,
            pause_check_every: self.pause_check_every,
            snippet: SnippetStyle {
                radius: self.snippet_radius,
                open: self.highlight_open.clone(),
                close: self.highlight_close.clone(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TOC
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocConfig {
    /// Built trees kept in the LRU cache
    pub cache_capacity: usize,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self { cache_capacity: 64 }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileToc {
    pub cache_capacity: Option<usize>,
}

impl TocConfig {
    pub fn from_file(file: Option<FileToc>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            cache_capacity: file
                .cache_capacity
                .unwrap_or(Self::default().cache_capacity)
                .max(1),
        }
    }
}
