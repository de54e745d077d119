//! Library catalog: which books exist and which shard holds each
//!
//! `{library_dir}/catalog.sqlite` carries one table:
//!
//! ```text
//! books(id INTEGER, title TEXT, archive INTEGER)   -- archive = shard id
//! ```

use anyhow::Context;
use rusqlite::{Connection, OpenFlags};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::engine::{BookId, BookRecord, ShardId, ShardInfo};

pub const CATALOG_FILE: &str = "catalog.sqlite";

/// Books grouped into shards, loaded once
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    shards: Vec<ShardInfo>,
    books: HashMap<BookId, (ShardId, BookRecord)>,
}

impl Catalog {
    /// Read the catalog of the library at `library_dir`
    ///
    /// # Errors
    /// Fails if the catalog file is missing, unreadable or lacks the
    /// `books` table.
    pub fn open(library_dir: &Path) -> anyhow::Result<Self> {
        let path = library_dir.join(CATALOG_FILE);
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;

        let mut stmt = conn
            .prepare("SELECT id, title, archive FROM books ORDER BY archive, id")
            .context("Catalog has no readable books table")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut grouped: BTreeMap<ShardId, Vec<BookRecord>> = BTreeMap::new();
        for row in rows {
            let (id, title, archive) = row?;
            let (Ok(id), Ok(shard)) = (BookId::try_from(id), ShardId::try_from(archive)) else {
                tracing::warn!("Catalog row skipped: book {} archive {}", id, archive);
                continue;
            };
            grouped.entry(shard).or_default().push(BookRecord {
                id,
                title: title.unwrap_or_default(),
            });
        }

        let catalog = Self::from_shards(
            grouped
                .into_iter()
                .map(|(shard, books)| ShardInfo::new(shard, books)),
        );
        tracing::debug!(
            "Catalog loaded: {} books in {} shards",
            catalog.books.len(),
            catalog.shards.len()
        );
        Ok(catalog)
    }

    /// Build from already-grouped shards; later duplicates of a book id lose
    pub fn from_shards(shards: impl IntoIterator<Item = ShardInfo>) -> Self {
        let mut shards: Vec<ShardInfo> = shards.into_iter().collect();
        shards.sort_by_key(|s| s.id);

        let mut books = HashMap::new();
        for shard in &shards {
            for book in shard.books() {
                books
                    .entry(book.id)
                    .or_insert_with(|| (shard.id, book.clone()));
            }
        }
        Self { shards, books }
    }

    pub fn shards(&self) -> &[ShardInfo] {
        &self.shards
    }

    pub fn shard_of(&self, book: BookId) -> Option<ShardId> {
        self.books.get(&book).map(|(shard, _)| *shard)
    }

    pub fn book(&self, book: BookId) -> Option<&BookRecord> {
        self.books.get(&book).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
