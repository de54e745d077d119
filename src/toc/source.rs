//! Where flat TOC records come from

use anyhow::Context;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::tree::TocFlatRecord;
use crate::catalog::Catalog;
use crate::engine::pool::shard_manager;
use crate::engine::{BookId, ShardId, TableName};

/// Blocking fetch of one book's flat TOC, ordered by id
pub trait TocSource: Send + Sync + 'static {
    fn fetch_records(&self, book: BookId) -> anyhow::Result<Vec<TocFlatRecord>>;
}

/// Reads `t{book}` from the book's shard
///
/// One small r2d2 pool per shard, opened on first use and kept.
pub struct SqliteTocSource {
    library_dir: PathBuf,
    catalog: Arc<Catalog>,
    pool_size: u32,
    pools: Mutex<HashMap<ShardId, Pool<SqliteConnectionManager>>>,
}

impl SqliteTocSource {
    pub fn new(library_dir: impl AsRef<Path>, catalog: Arc<Catalog>, pool_size: u32) -> Self {
        Self {
            library_dir: library_dir.as_ref().to_path_buf(),
            catalog,
            pool_size: pool_size.max(1),
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn pool(&self, shard: ShardId) -> anyhow::Result<Pool<SqliteConnectionManager>> {
        let mut pools = self.pools.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pool) = pools.get(&shard) {
            return Ok(pool.clone());
        }

        let pool = Pool::builder()
            .max_size(self.pool_size)
            .build(shard_manager(&self.library_dir, shard))
            .with_context(|| format!("Failed to open lookup pool for shard {}", shard))?;

        // Verify connection works
        let conn = pool.get()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
        drop(conn);

        tracing::debug!("Lookup pool opened for shard {}", shard);
        pools.insert(shard, pool.clone());
        Ok(pool)
    }
}

impl TocSource for SqliteTocSource {
    fn fetch_records(&self, book: BookId) -> anyhow::Result<Vec<TocFlatRecord>> {
        let shard = self
            .catalog
            .shard_of(book)
            .with_context(|| format!("Book {} is not in the catalog", book))?;
        let conn = self.pool(shard)?.get()?;

        let sql = format!(
            "SELECT id, title, level, sub_level FROM {} ORDER BY id",
            TableName::for_book(book).toc_table()
        );
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("Book {} has no TOC table", book))?;
        let records = stmt
            .query_map([], |row| {
                Ok(TocFlatRecord {
                    id: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    level: row.get::<_, Option<i64>>(2)?.unwrap_or(1),
                    sub_level: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::LibraryFixture;

    #[test]
    fn test_reads_records_in_id_order() {
        let fixture = LibraryFixture::new();
        fixture.add_book(3, 42, "أ", &["نص"]);
        fixture.add_toc(3, 42, &[(9, "باب", 2, 0), (1, "كتاب", 1, 0)]);
        fixture.write_catalog();

        let catalog = Arc::new(Catalog::open(fixture.dir()).unwrap());
        let source = SqliteTocSource::new(fixture.dir(), catalog, 2);
        let records = source.fetch_records(42).unwrap();

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 9]);
        assert_eq!(records[0].title, "كتاب");
        assert_eq!(records[1].level, 2);
    }

    #[test]
    fn test_unknown_book_fails() {
        let fixture = LibraryFixture::new();
        fixture.add_book(1, 1, "أ", &["نص"]);
        fixture.write_catalog();

        let catalog = Arc::new(Catalog::open(fixture.dir()).unwrap());
        let source = SqliteTocSource::new(fixture.dir(), catalog, 2);
        let err = source.fetch_records(77).unwrap_err();
        assert!(err.to_string().contains("not in the catalog"));
    }

    #[test]
    fn test_missing_toc_table_fails() {
        let fixture = LibraryFixture::new();
        fixture.add_book(1, 5, "أ", &["نص"]);
        fixture.write_catalog();

        let catalog = Arc::new(Catalog::open(fixture.dir()).unwrap());
        let source = SqliteTocSource::new(fixture.dir(), catalog, 2);
        assert!(source.fetch_records(5).is_err());
    }
}
