// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - search: stream full-text results across the library
// - toc: print a book's table of contents
// - config --show / --path / --reset / --edit: configuration management

use crate::catalog::Catalog;
use crate::config::{Config, VERSION};
use crate::engine::{
    AllowedTables, BookId, MatchMode, RunSummary, SearchEngine, SearchEvent, SearchQuery,
    SearchResultItem, ShardPool, TableName,
};
use crate::toc::{SqliteTocSource, TocLoader, TocNode};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::process::Command;
use std::sync::Arc;
use tokio::sync::mpsc;

/// maktaba - full-text search over a sharded SQLite library
#[derive(Parser)]
#[command(name = "maktaba")]
#[command(version = VERSION)]
#[command(about = "Full-text search over a sharded SQLite library", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search every book (or the given ones) for keywords
    Search {
        /// Keywords, already normalized
        #[arg(required = true, num_args = 1..)]
        keywords: Vec<String>,

        /// Match the keywords as one phrase or each anywhere in the row
        #[arg(long, value_enum, default_value_t = ModeArg::Phrase)]
        mode: ModeArg,

        /// Restrict the search to these book ids (repeatable)
        #[arg(long = "book", value_name = "ID")]
        books: Vec<BookId>,

        /// Print results as JSON lines
        #[arg(long)]
        json: bool,

        /// Stop after this many results
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Print the table of contents of a book
    Toc {
        book_id: BookId,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(long)]
        edit: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Phrase,
    Contains,
}

impl From<ModeArg> for MatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Phrase => MatchMode::Phrase,
            ModeArg::Contains => MatchMode::Contains,
        }
    }
}

/// Handle `config` without loading the configuration first
///
/// Returns true if a command was handled (exit after).
pub fn handle_config_command(command: &Commands) -> bool {
    let Commands::Config {
        show,
        reset,
        edit,
        path,
    } = command
    else {
        return false;
    };

    if *path {
        handle_config_path();
    } else if *show {
        handle_config_show();
    } else if *reset {
        handle_config_reset();
    } else if *edit {
        handle_config_edit();
    } else {
        println!("Usage: maktaba config [--show|--reset|--edit|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --edit    Open config file in $EDITOR");
        println!("  --path    Show config file path");
    }
    true
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err()
            || !input.trim().eq_ignore_ascii_case("y")
        {
            println!("Aborted.");
            return;
        }
    }

    if let Err(e) = Config::default().save() {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Config reset to defaults: {}", path.display());
}

fn handle_config_edit() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            if cfg!(windows) {
                "notepad".to_string()
            } else {
                "nano".to_string()
            }
        });

    println!("Opening {} with {}", path.display(), editor);

    match Command::new(&editor).arg(&path).status() {
        Ok(s) if s.success() => {}
        Ok(s) => {
            eprintln!("Editor exited with status: {}", s);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to launch editor '{}': {}", editor, e);
            eprintln!("Set $EDITOR environment variable to your preferred editor");
            std::process::exit(1);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// search
// ─────────────────────────────────────────────────────────────────────────────

/// Open every catalog shard and register it with a fresh engine
fn build_engine(config: &Config, catalog: &Catalog) -> Arc<SearchEngine> {
    let engine = SearchEngine::new(config.search.engine_settings());
    for shard in catalog.shards() {
        let pool = ShardPool::open(&config.library_dir, shard.id, config.search.pool_size);
        engine.register_shard(shard.clone(), pool, config.search.batch_size);
    }
    Arc::new(engine)
}

pub async fn run_search(
    config: &Config,
    keywords: Vec<String>,
    mode: ModeArg,
    books: Vec<BookId>,
    json: bool,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let catalog = Catalog::open(&config.library_dir)?;
    let engine = build_engine(config, &catalog);

    let allowed: Option<AllowedTables> = if books.is_empty() {
        None
    } else {
        Some(books.into_iter().map(TableName::for_book).collect())
    };

    let query = SearchQuery::new(mode.into(), keywords);
    let (tx, mut rx) = mpsc::unbounded_channel();
    if !engine.start_search(query, allowed, Arc::new(tx)) {
        eprintln!("Nothing to search for");
        return Ok(());
    }

    let mut printed = 0;
    let mut stdout = std::io::stdout().lock();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SearchEvent::Result(item)) => {
                    if limit.is_some_and(|n| printed >= n) {
                        continue;
                    }
                    print_result(&mut stdout, &item, json)?;
                    printed += 1;
                    if limit.is_some_and(|n| printed >= n) {
                        engine.stop();
                    }
                }
                Some(SearchEvent::TableCompleted { completed_tables, total_tables, .. }) => {
                    tracing::debug!("{}/{} tables searched", completed_tables, total_tables);
                }
                Some(SearchEvent::Completed(summary)) => {
                    print_summary(&summary, printed);
                    break;
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Stopping search...");
                engine.stop();
            }
        }
    }

    Ok(())
}

fn print_result(out: &mut impl Write, item: &SearchResultItem, json: bool) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(item)?)?;
    } else {
        writeln!(
            out,
            "[{} #{} p.{}/{}] {}: {}",
            item.table, item.content_id, item.part, item.page, item.book_title, item.snippet
        )?;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, printed: usize) {
    eprintln!(
        "{} results shown ({} found) in {}/{} tables{}",
        printed,
        summary.results,
        summary.completed_tables,
        summary.total_tables,
        if summary.stopped { ", stopped" } else { "" }
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// toc
// ─────────────────────────────────────────────────────────────────────────────

pub async fn run_toc(config: &Config, book: BookId) -> anyhow::Result<()> {
    let catalog = Arc::new(Catalog::open(&config.library_dir)?);
    if let Some(record) = catalog.book(book) {
        println!("{}", record.title);
    }

    let source = SqliteTocSource::new(
        &config.library_dir,
        catalog.clone(),
        config.search.lookup_pool_size,
    );
    let loader = TocLoader::new(Arc::new(source), config.toc.cache_capacity);
    let tree = loader.load(book).await?;

    let mut stdout = std::io::stdout().lock();
    for root in tree.iter() {
        print_node(&mut stdout, root)?;
    }
    Ok(())
}

fn print_node(out: &mut impl Write, root: &TocNode) -> std::io::Result<()> {
    for (depth, node) in root.walk() {
        let end = if node.end_id == i64::MAX {
            "end".to_string()
        } else {
            node.end_id.to_string()
        };
        writeln!(
            out,
            "{}{} [{}..{}]",
            "  ".repeat(depth + 1),
            node.title,
            node.id,
            end
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_args_parse() {
        let cli = Cli::try_parse_from([
            "maktaba", "search", "كتاب", "علم", "--mode", "contains", "--book", "3", "--book",
            "9", "--limit", "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                keywords,
                mode,
                books,
                json,
                limit,
            } => {
                assert_eq!(keywords, vec!["كتاب", "علم"]);
                assert_eq!(mode, ModeArg::Contains);
                assert_eq!(books, vec![3, 9]);
                assert!(!json);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_search_requires_keywords() {
        assert!(Cli::try_parse_from(["maktaba", "search"]).is_err());
    }

    #[test]
    fn test_json_result_line() {
        let item = SearchResultItem {
            shard_id: 2,
            table: TableName::for_book(14),
            content_id: 7,
            book_title: "أ".to_string(),
            page: 7,
            part: 1,
            snippet: "<mark>علم</mark>".to_string(),
        };
        let mut out = Vec::new();
        print_result(&mut out, &item, true).unwrap();
        let line = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["table"], "b14");
        assert_eq!(value["content_id"], 7);
    }

    #[test]
    fn test_toc_lines_are_indented() {
        let root = TocNode {
            id: 1,
            title: "كتاب".to_string(),
            level: 1,
            sub_level: 0,
            end_id: 9,
            children: vec![TocNode {
                id: 2,
                title: "باب".to_string(),
                level: 2,
                sub_level: 0,
                end_id: i64::MAX,
                children: Vec::new(),
            }],
        };
        let mut out = Vec::new();
        print_node(&mut out, &root).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "  كتاب [1..9]\n    باب [2..end]\n"
        );
    }
}
