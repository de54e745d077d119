// maktaba - full-text search over a sharded SQLite library
//
// Architecture:
// - Catalog: maps books to shard files
// - Search engine: scans shard tables in parallel windows, streaming results
//   through an ordered channel; Ctrl+C stops the run cleanly
// - TOC loader: builds each book's heading tree once, shared by concurrent callers

use anyhow::Result;
use clap::Parser;
use maktaba::cli::{self, Cli, Commands};
use maktaba::config::Config;
use maktaba::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands run before the configuration is loaded so that a
    // broken file can still be shown, located or reset
    if cli::handle_config_command(&cli.command) {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            std::process::exit(1);
        }
    };

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = logging::init(&config.logging);

    tracing::debug!(
        "maktaba {} using library {}",
        maktaba::config::VERSION,
        config.library_dir.display()
    );

    match cli.command {
        Commands::Search {
            keywords,
            mode,
            books,
            json,
            limit,
        } => cli::run_search(&config, keywords, mode, books, json, limit).await,
        Commands::Toc { book_id } => cli::run_toc(&config, book_id).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// A broken config should fail fast with a clear error, not silently fall
/// back to defaults
fn report_config_error(e: &anyhow::Error) {
    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║  CONFIG ERROR - Failed to load configuration file           ║");
    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
    if let Some(path) = Config::config_path() {
        eprintln!("  File: {}\n", path.display());
    }
    eprintln!("  Error: {:#}\n", e);
    eprintln!("  Tip: Check for:\n");
    eprintln!("    - Missing quotes around string values");
    eprintln!("    - Numbers given as strings (pool_size = 4, not \"4\")");
    eprintln!("    - Typos in section names\n");
    eprintln!("  To reset, run `maktaba config --reset`.\n");
}
