//! Partitioned full-text scan of one book table
//!
//! # Algorithm
//!
//! ```text
//! COUNT(*) MATCH ?          → total (0 → done, no windows)
//! chunk = ceil(total / n)   → window k = [k*chunk, min((k+1)*chunk, total))
//!
//! window 0 ──→ slot 0: LIMIT batch OFFSET 0, batch, 2*batch ... ─┐
//! window 1 ──→ slot 1: ...                                       ├──→ JoinSet
//! window n ──→ slot n: ...                                       ┘      │
//!                                                                       └──→ rows delivered
//!                                                                            per finished window
//! ```
//!
//! Rows of one window keep storage order; windows are delivered in the order
//! they finish. Once stop is observed, unfinished windows are aborted and the
//! rows of a window that saw the stop are dropped rather than surfaced.

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

use super::codec::{StoredBody, TextCodec};
use super::events::{EventSink, SearchEvent};
use super::pool::ShardPool;
use super::run::RunControl;
use super::snippet::SnippetRenderer;
use super::types::{ContentRow, SearchResultItem, ShardId, TableName};

/// Tuning knobs for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Rows per `LIMIT` page inside a window
    pub batch_size: usize,
    /// Row-progress report granularity
    pub progress_every: usize,
    /// Stop/pause check granularity while decoding a page
    pub pause_check_every: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            progress_every: 10,
            pause_check_every: 10,
        }
    }
}

/// Contiguous `[offset, offset + limit)` slice of a table's match set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub slot: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Split `total` matches across `pool_size` slots
///
/// Windows are disjoint and cover `[0, total)`; trailing slots whose share
/// would be empty get no window.
pub fn partition(total: usize, pool_size: usize) -> Vec<Window> {
    if total == 0 || pool_size == 0 {
        return Vec::new();
    }
    let chunk = total.div_ceil(pool_size);

    (0..pool_size)
        .filter_map(|slot| {
            let offset = slot * chunk;
            let limit = chunk.min(total.saturating_sub(offset));
            (limit > 0).then_some(Window {
                slot,
                offset,
                limit,
            })
        })
        .collect()
}

/// What a table scan amounted to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOutcome {
    pub total: usize,
    pub delivered: usize,
    pub stopped: bool,
}

/// Row as read from SQLite, before the body is decoded
struct RawRow {
    id: i64,
    body: StoredBody,
    page: i64,
    part: i64,
    chapter: Option<i64>,
    verse: Option<i64>,
}

impl RawRow {
    fn decode(self, codec: &dyn TextCodec) -> ContentRow {
        ContentRow {
            id: self.id,
            text: self.body.decode(codec),
            page: self.page,
            part: self.part,
            chapter: self.chapter,
            verse: self.verse,
        }
    }
}

enum WindowOutcome {
    Finished(Vec<ContentRow>),
    Cancelled,
}

/// Monotonic per-table row counter, reported in steps
struct Progress {
    shard: ShardId,
    table: TableName,
    total: usize,
    every: usize,
    state: Mutex<(usize, usize)>, // (current, last reported)
}

impl Progress {
    fn report(&self, sink: &EventSink, current: usize) {
        sink.send(SearchEvent::RowProgress {
            shard_id: self.shard,
            table: self.table,
            current,
            total: self.total,
        });
    }

    /// Count one row; sending under the lock keeps reports in order
    fn advance(&self, sink: &EventSink) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.0 += 1;
        if state.0 - state.1 >= self.every {
            state.1 = state.0;
            self.report(sink, state.0);
        }
    }

    fn flush(&self, sink: &EventSink) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.0 != state.1 {
            state.1 = state.0;
            self.report(sink, state.0);
        }
    }
}

/// Everything one window task needs, shared across a table's windows
struct WindowJob {
    pool: Arc<ShardPool>,
    codec: Arc<dyn TextCodec>,
    control: Arc<RunControl>,
    sink: EventSink,
    settings: ScanSettings,
    sql: Arc<str>,
    expr: Arc<str>,
    progress: Progress,
}

/// Scans tables of one shard
pub(crate) struct TableScanner {
    pub pool: Arc<ShardPool>,
    pub codec: Arc<dyn TextCodec>,
    pub snippets: Arc<SnippetRenderer>,
    pub control: Arc<RunControl>,
    pub sink: EventSink,
    pub settings: ScanSettings,
}

impl TableScanner {
    pub async fn scan(&self, table: TableName, title: &str, expr: Arc<str>) -> TableOutcome {
        let shard = self.pool.shard();

        let count_sql = format!(
            "SELECT COUNT(*) FROM fts.{} f WHERE f.content_clean MATCH ?1",
            table.fts_table()
        );
        let count_expr = expr.clone();
        let counted = self
            .pool
            .read(0, move |conn| {
                conn.query_row(&count_sql, [count_expr.as_ref()], |row| row.get::<_, i64>(0))
            })
            .await;

        let total = match counted {
            Ok(n) => n.max(0) as usize,
            Err(e) => {
                tracing::warn!("Shard {} table {}: count query failed: {}", shard, table, e);
                0
            }
        };
        if total == 0 {
            tracing::debug!("Shard {} table {}: no matches", shard, table);
            return TableOutcome::default();
        }

        let progress = Progress {
            shard,
            table,
            total,
            every: self.settings.progress_every.max(1),
            state: Mutex::new((0, 0)),
        };
        progress.report(&self.sink, 0);

        if self.control.is_stopped() {
            return TableOutcome {
                total,
                delivered: 0,
                stopped: true,
            };
        }

        let windows = partition(total, self.pool.len());
        tracing::debug!(
            "Shard {} table {}: {} matches over {} windows",
            shard,
            table,
            total,
            windows.len()
        );

        let job = Arc::new(WindowJob {
            pool: self.pool.clone(),
            codec: self.codec.clone(),
            control: self.control.clone(),
            sink: self.sink.clone(),
            settings: self.settings,
            sql: content_sql(table).into(),
            expr,
            progress,
        });

        let mut set = JoinSet::new();
        for window in windows {
            set.spawn(fetch_window(window, job.clone()));
        }

        let mut delivered = 0;
        while let Some(joined) = set.join_next().await {
            if self.control.is_stopped() {
                set.abort_all();
                return TableOutcome {
                    total,
                    delivered,
                    stopped: true,
                };
            }

            match joined {
                Ok(WindowOutcome::Finished(rows)) => {
                    for row in rows {
                        self.deliver(table, title, row);
                        delivered += 1;
                    }
                }
                Ok(WindowOutcome::Cancelled) => {
                    set.abort_all();
                    return TableOutcome {
                        total,
                        delivered,
                        stopped: true,
                    };
                }
                Err(e) => {
                    tracing::warn!("Shard {} table {}: window task failed: {}", shard, table, e);
                }
            }
        }

        job.progress.flush(&self.sink);
        TableOutcome {
            total,
            delivered,
            stopped: false,
        }
    }

    fn deliver(&self, table: TableName, title: &str, row: ContentRow) {
        let item = SearchResultItem {
            shard_id: self.pool.shard(),
            table,
            content_id: row.id,
            book_title: title.to_string(),
            page: row.page,
            part: row.part,
            snippet: self.snippets.render(&row.text),
        };
        self.control.count_result();
        self.sink.send(SearchEvent::Result(item));
    }
}

fn content_sql(table: TableName) -> String {
    format!(
        "SELECT c.id, c.content, c.page, c.part, c.chapter, c.verse
         FROM fts.{fts} f JOIN main.{table} c ON c.id = f.rowid
         WHERE f.content_clean MATCH ?1
         LIMIT ?2 OFFSET ?3",
        fts = table.fts_table(),
        table = table,
    )
}

fn fetch_page(
    conn: &Connection,
    sql: &str,
    expr: &str,
    limit: usize,
    offset: usize,
) -> rusqlite::Result<Vec<RawRow>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![expr, limit as i64, offset as i64], |row| {
        Ok(RawRow {
            id: row.get(0)?,
            body: StoredBody::from_value(row.get_ref(1)?),
            page: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            part: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
            chapter: row.get(4)?,
            verse: row.get(5)?,
        })
    })?;
    rows.collect()
}

/// Walk one window page by page until exhausted, stopped or interrupted
async fn fetch_window(window: Window, job: Arc<WindowJob>) -> WindowOutcome {
    let control = &job.control;
    let check_every = job.settings.pause_check_every.max(1);
    let mut rows = Vec::with_capacity(window.limit.min(job.settings.batch_size));
    let mut fetched = 0;

    while fetched < window.limit {
        if control.is_stopped() {
            return WindowOutcome::Cancelled;
        }
        control.gate().wait_if_paused().await;
        if control.is_stopped() {
            return WindowOutcome::Cancelled;
        }

        let want = job.settings.batch_size.max(1).min(window.limit - fetched);
        let offset = window.offset + fetched;
        let sql = job.sql.clone();
        let expr = job.expr.clone();

        let page = match job
            .pool
            .read(window.slot, move |conn| fetch_page(conn, &sql, &expr, want, offset))
            .await
        {
            Ok(page) => page,
            Err(e) if e.is_interrupt() => {
                tracing::debug!("Window at offset {} interrupted", offset);
                break;
            }
            Err(e) => {
                tracing::warn!(
                    "Shard {} table {}: window at offset {} failed, keeping {} rows: {}",
                    job.pool.shard(),
                    job.progress.table,
                    offset,
                    rows.len(),
                    e
                );
                break;
            }
        };

        let got = page.len();
        for (i, raw) in page.into_iter().enumerate() {
            if i > 0 && i % check_every == 0 {
                if control.is_stopped() {
                    return WindowOutcome::Cancelled;
                }
                control.gate().wait_if_paused().await;
                if control.is_stopped() {
                    return WindowOutcome::Cancelled;
                }
            }
            rows.push(raw.decode(job.codec.as_ref()));
            job.progress.advance(&job.sink);
        }

        fetched += got;
        if got < want {
            // End of data before the nominal limit
            break;
        }
    }

    if control.is_stopped() {
        return WindowOutcome::Cancelled;
    }
    WindowOutcome::Finished(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_range_disjointly() {
        for total in 0..60 {
            for pool_size in 1..9 {
                let windows = partition(total, pool_size);
                let mut next = 0;
                for w in &windows {
                    assert_eq!(w.offset, next, "total={} pool={}", total, pool_size);
                    assert!(w.limit > 0);
                    assert!(w.slot < pool_size);
                    next = w.offset + w.limit;
                }
                assert_eq!(next, total, "total={} pool={}", total, pool_size);
            }
        }
    }

    #[test]
    fn test_partition_skips_empty_windows() {
        // ceil(5/4) = 2 → [0,2) [2,4) [4,5), slot 3 gets nothing
        let windows = partition(5, 4);
        assert_eq!(
            windows,
            vec![
                Window { slot: 0, offset: 0, limit: 2 },
                Window { slot: 1, offset: 2, limit: 2 },
                Window { slot: 2, offset: 4, limit: 1 },
            ]
        );
    }

    #[test]
    fn test_partition_empty_pool() {
        assert!(partition(10, 0).is_empty());
    }
}
