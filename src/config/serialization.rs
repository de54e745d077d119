//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Serialize config to TOML string (single source of truth for format)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# maktaba configuration

# Directory holding catalog.sqlite, {{shard}}.sqlite and {{shard}}_fts.sqlite
library_dir = {library_dir}

# Full-text search tuning
[search]
pool_size = {pool_size}                # parallel windows per shard
lookup_pool_size = {lookup_pool_size}  # connections per shard for TOC reads
batch_size = {batch_size}              # rows per page
progress_every = {progress_every}      # rows between progress reports
pause_check_every = {pause_check_every}  # rows between stop/pause checks
snippet_radius = {snippet_radius}      # characters either side of the first match
highlight_open = {highlight_open}
highlight_close = {highlight_close}

# Table-of-contents cache
[toc]
cache_capacity = {cache_capacity}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# File logging (JSON lines, in addition to stderr)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            library_dir = quote(&self.library_dir.display().to_string()),
            pool_size = self.search.pool_size,
            lookup_pool_size = self.search.lookup_pool_size,
            batch_size = self.search.batch_size,
            progress_every = self.search.progress_every,
            pause_check_every = self.search.pause_check_every,
            snippet_radius = self.search.snippet_radius,
            highlight_open = quote(&self.search.highlight_open),
            highlight_close = quote(&self.search.highlight_close),
            cache_capacity = self.toc.cache_capacity,
            log_level = quote(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = quote(&self.logging.file_dir.display().to_string()),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = quote(&self.logging.file_prefix),
        )
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = Self::config_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config path",
            ));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_toml())
    }
}

/// TOML basic string with backslashes and quotes escaped
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
