//! SQLite library fixtures for unit tests
//!
//! Builds a throwaway library directory laid out the way the engine expects:
//! `{shard}.sqlite` with `b{book}` / `t{book}` tables, `{shard}_fts.sqlite`
//! with `b{book}_fts` FTS5 tables, and `catalog.sqlite`.

use rusqlite::types::Value;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

use crate::catalog::CATALOG_FILE;
use crate::engine::codec::{TextCodec, ZlibCodec};
use crate::engine::pool::{fts_path, shard_path};
use crate::engine::{BookId, BookRecord, ShardId, ShardInfo};

pub(crate) struct LibraryFixture {
    dir: TempDir,
    books: Mutex<Vec<(ShardId, BookRecord)>>,
}

impl LibraryFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            books: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Plain-text rows; the FTS column indexes the same text
    pub fn add_book(&self, shard: ShardId, book: BookId, title: &str, rows: &[&str]) {
        let rows: Vec<(Value, String)> = rows
            .iter()
            .map(|t| (Value::Text(t.to_string()), t.to_string()))
            .collect();
        self.add_rows(shard, book, title, &rows);
    }

    /// zlib-compressed rows
    pub fn add_compressed_book(&self, shard: ShardId, book: BookId, title: &str, rows: &[&str]) {
        let rows: Vec<(Value, String)> = rows
            .iter()
            .map(|t| (Value::Blob(ZlibCodec.encode(t).unwrap()), t.to_string()))
            .collect();
        self.add_rows(shard, book, title, &rows);
    }

    /// `n` identical matching rows
    pub fn add_repeated_book(&self, shard: ShardId, book: BookId, title: &str, text: &str, n: usize) {
        let rows: Vec<&str> = std::iter::repeat(text).take(n).collect();
        self.add_book(shard, book, title, &rows);
    }

    /// Rows given as (stored payload, indexed clean text); ids, pages from 1
    pub fn add_rows(&self, shard: ShardId, book: BookId, title: &str, rows: &[(Value, String)]) {
        let main = Connection::open(shard_path(self.dir(), shard)).unwrap();
        main.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS b{book} (
                id INTEGER PRIMARY KEY,
                content,
                page INTEGER,
                part INTEGER,
                chapter INTEGER,
                verse INTEGER
            );"
        ))
        .unwrap();

        let fts = Connection::open(fts_path(self.dir(), shard)).unwrap();
        fts.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS b{book}_fts USING fts5(content_clean);"
        ))
        .unwrap();

        for (i, (payload, clean)) in rows.iter().enumerate() {
            let id = i as i64 + 1;
            let chapter: Option<i64> = if i % 2 == 0 { Some(1) } else { None };
            main.execute(
                &format!(
                    "INSERT INTO b{book} (id, content, page, part, chapter, verse)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![id, payload, id, 1 + (i as i64 / 100), chapter, chapter.map(|_| id)],
            )
            .unwrap();
            fts.execute(
                &format!("INSERT INTO b{book}_fts (rowid, content_clean) VALUES (?1, ?2)"),
                params![id, clean],
            )
            .unwrap();
        }

        self.books.lock().unwrap().push((
            shard,
            BookRecord {
                id: book,
                title: title.to_string(),
            },
        ));
    }

    /// Flat TOC records: (id, title, level, sub_level)
    pub fn add_toc(&self, shard: ShardId, book: BookId, records: &[(i64, &str, i64, i64)]) {
        let main = Connection::open(shard_path(self.dir(), shard)).unwrap();
        main.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS t{book} (
                id INTEGER,
                title TEXT,
                level INTEGER,
                sub_level INTEGER
            );"
        ))
        .unwrap();
        for (id, title, level, sub) in records {
            main.execute(
                &format!("INSERT INTO t{book} (id, title, level, sub_level) VALUES (?1, ?2, ?3, ?4)"),
                params![id, title, level, sub],
            )
            .unwrap();
        }
    }

    /// Write `catalog.sqlite` listing every book added so far
    pub fn write_catalog(&self) {
        let conn = Connection::open(self.dir().join(CATALOG_FILE)).unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS books (id INTEGER, title TEXT, archive INTEGER);
             DELETE FROM books;",
        )
        .unwrap();
        for (shard, book) in self.books.lock().unwrap().iter() {
            conn.execute(
                "INSERT INTO books (id, title, archive) VALUES (?1, ?2, ?3)",
                params![book.id as i64, book.title, shard],
            )
            .unwrap();
        }
    }

    pub fn shard_info(&self, shard: ShardId) -> ShardInfo {
        let books = self.books.lock().unwrap();
        ShardInfo::new(
            shard,
            books
                .iter()
                .filter(|(s, _)| *s == shard)
                .map(|(_, b)| b.clone()),
        )
    }
}
