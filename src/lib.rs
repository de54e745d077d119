//! maktaba - concurrent full-text search over a sharded SQLite library
//!
//! A library is a directory of shard files (`{shard}.sqlite` holding book
//! tables, `{shard}_fts.sqlite` holding their FTS5 indexes) plus a
//! `catalog.sqlite` mapping books to shards.
//!
//! - `engine` - Cancellable, pausable parallel search over registered shards
//! - `toc` - Table-of-contents trees, built once per book under concurrent demand
//! - `catalog` - Book to shard mapping
//! - `config` - Layered configuration (env > file > defaults)
//! - `logging` - Subscriber setup for the binary
//! - `cli` - Command-line front end

pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod toc;

#[cfg(test)]
mod test_support;
