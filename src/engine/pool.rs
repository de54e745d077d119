//! Slot-addressed connection pool for one shard
//!
//! # Architecture
//!
//! ```text
//! TableScanner window k
//!         │
//!         └──→ ShardPool::read(k, op)
//!                 │
//!                 └──→ spawn_blocking ──→ slot[k % n] (Mutex<Connection>)
//!                                             │
//!                                             ├──→ main: {shard}.sqlite (read-only)
//!                                             └──→ fts:  {shard}_fts.sqlite (attached)
//! ```
//!
//! Unlike a checkout pool, every window is pinned to one connection for the
//! whole offset walk, so two windows never contend unless they share a slot.

use r2d2::ManageConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, InterruptHandle, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::types::ShardId;

/// Errors from a pooled read
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("shard {0} has no open connections")]
    Unavailable(ShardId),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("pooled read task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("connection mutex poisoned")]
    Poisoned,
}

impl PoolError {
    /// The statement was abandoned through `interrupt_all`
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            PoolError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::OperationInterrupted
        )
    }
}

struct Slot {
    conn: Arc<Mutex<Connection>>,
    interrupt: InterruptHandle,
}

/// Fixed set of Row Sources for one shard file
pub struct ShardPool {
    shard: ShardId,
    slots: Vec<Slot>,
}

/// Path of a shard's main file
pub fn shard_path(dir: &Path, shard: ShardId) -> PathBuf {
    dir.join(format!("{}.sqlite", shard))
}

/// Path of a shard's FTS sibling file
pub fn fts_path(dir: &Path, shard: ShardId) -> PathBuf {
    dir.join(format!("{}_fts.sqlite", shard))
}

/// Connection manager shared by the search pool and the lookup pools
///
/// Opens the shard read-only and attaches the FTS sibling as schema `fts`.
pub fn shard_manager(dir: &Path, shard: ShardId) -> SqliteConnectionManager {
    let fts = fts_path(dir, shard).to_string_lossy().into_owned();
    SqliteConnectionManager::file(shard_path(dir, shard))
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_init(move |conn| {
            conn.execute("ATTACH DATABASE ?1 AS fts", [&fts])?;
            Ok(())
        })
}

impl ShardPool {
    /// Open up to `size` connections to a shard
    ///
    /// A connection that fails to open is logged and skipped; the pool is
    /// built with whatever opened. Callers treat an empty pool as
    /// "shard unavailable".
    pub fn open(dir: &Path, shard: ShardId, size: usize) -> Self {
        let manager = shard_manager(dir, shard);
        let mut conns = Vec::with_capacity(size);

        for slot in 0..size {
            match manager.connect() {
                Ok(conn) => conns.push(conn),
                Err(e) => {
                    tracing::warn!("Shard {} connection {} failed to open: {}", shard, slot, e);
                }
            }
        }

        tracing::debug!("Shard {} pool opened with {}/{} connections", shard, conns.len(), size);
        Self::from_connections(shard, conns)
    }

    /// Build a pool from already-open connections
    pub fn from_connections(shard: ShardId, conns: Vec<Connection>) -> Self {
        let slots = conns
            .into_iter()
            .map(|conn| Slot {
                interrupt: conn.get_interrupt_handle(),
                conn: Arc::new(Mutex::new(conn)),
            })
            .collect();
        Self { shard, slots }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `op` against slot `slot % len` on the blocking pool
    pub async fn read<T, F>(&self, slot: usize, op: F) -> Result<T, PoolError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.slots.is_empty() {
            return Err(PoolError::Unavailable(self.shard));
        }
        let conn = Arc::clone(&self.slots[slot % self.slots.len()].conn);

        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| PoolError::Poisoned)?;
            op(&guard).map_err(PoolError::from)
        })
        .await?
    }

    /// Abandon whatever statement each slot is currently stepping
    pub fn interrupt_all(&self) {
        for slot in &self.slots {
            slot.interrupt.interrupt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::LibraryFixture;

    #[tokio::test]
    async fn test_open_missing_shard_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ShardPool::open(dir.path(), 77, 4);
        assert!(pool.is_empty());

        let err = pool.read(0, |c| c.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))).await;
        assert!(matches!(err, Err(PoolError::Unavailable(77))));
    }

    #[tokio::test]
    async fn test_open_attaches_fts_sibling() {
        let fixture = LibraryFixture::new();
        fixture.add_book(1, 5, "كتاب", &["نص في العلم"]);

        let pool = ShardPool::open(fixture.dir(), 1, 3);
        assert_eq!(pool.len(), 3);

        let count = pool
            .read(7, |c| {
                c.query_row(
                    "SELECT COUNT(*) FROM fts.b5_fts f WHERE f.content_clean MATCH ?1",
                    ["العلم"],
                    |r| r.get::<_, i64>(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_pool_is_read_only() {
        let fixture = LibraryFixture::new();
        fixture.add_book(2, 1, "x", &["a"]);
        let pool = ShardPool::open(fixture.dir(), 2, 1);

        let result = pool
            .read(0, |c| c.execute("DELETE FROM b1", []))
            .await;
        assert!(matches!(result, Err(PoolError::Sqlite(_))));
        assert!(!result.unwrap_err().is_interrupt());
    }
}
