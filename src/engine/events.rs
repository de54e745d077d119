//! Search run events and their delivery to the caller
//!
//! Every task of a run (scanner windows, shard workers, the run itself) pushes
//! `SearchEvent`s into one unbounded channel. A single delivery task drains it
//! and calls the observer, so callbacks never run concurrently and arrive in
//! the order they were produced.
//!
//! ```text
//! window tasks ─┐
//! scanner      ─┼──→ mpsc (ordered) ──→ delivery task ──→ SearchObserver
//! shard worker ─┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::run::RunControl;
use super::types::{SearchResultItem, ShardId, TableName};

/// Final accounting of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_shards: usize,
    pub completed_shards: usize,
    pub total_tables: usize,
    pub completed_tables: usize,
    pub results: usize,
    pub stopped: bool,
}

/// Everything a run reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    Initialized {
        total_shards: usize,
        total_tables: usize,
    },
    RowProgress {
        shard_id: ShardId,
        table: TableName,
        current: usize,
        total: usize,
    },
    Result(SearchResultItem),
    TableCompleted {
        shard_id: ShardId,
        table: TableName,
        completed_tables: usize,
        total_tables: usize,
    },
    ShardCompleted {
        shard_id: ShardId,
        completed_shards: usize,
        total_shards: usize,
    },
    Completed(RunSummary),
}

impl SearchEvent {
    /// Events that must not reach the caller once stop has been requested
    fn suppressed_after_stop(&self) -> bool {
        matches!(
            self,
            SearchEvent::RowProgress { .. }
                | SearchEvent::Result(_)
                | SearchEvent::TableCompleted { .. }
                | SearchEvent::ShardCompleted { .. }
        )
    }
}

/// Caller-side callbacks for a search run
///
/// All methods default to no-ops. They are invoked from the run's delivery
/// task, one at a time, so implementations only need `Send + Sync` to be
/// handed to the engine, not internal ordering logic.
pub trait SearchObserver: Send + Sync {
    fn on_initialize(&self, _total_shards: usize, _total_tables: usize) {}

    fn on_row_progress(&self, _shard: ShardId, _table: TableName, _current: usize, _total: usize) {}

    fn on_result(&self, _item: SearchResultItem) {}

    fn on_table_complete(&self, _shard: ShardId, _table: TableName, _completed: usize, _total: usize) {}

    fn on_shard_complete(&self, _shard: ShardId, _completed: usize, _total: usize) {}

    /// Fired exactly once per run, including runs that were stopped
    fn on_complete(&self, _summary: RunSummary) {}
}

/// Forward every callback as a `SearchEvent` on a channel
impl SearchObserver for mpsc::UnboundedSender<SearchEvent> {
    fn on_initialize(&self, total_shards: usize, total_tables: usize) {
        let _ = self.send(SearchEvent::Initialized {
            total_shards,
            total_tables,
        });
    }

    fn on_row_progress(&self, shard_id: ShardId, table: TableName, current: usize, total: usize) {
        let _ = self.send(SearchEvent::RowProgress {
            shard_id,
            table,
            current,
            total,
        });
    }

    fn on_result(&self, item: SearchResultItem) {
        let _ = self.send(SearchEvent::Result(item));
    }

    fn on_table_complete(&self, shard_id: ShardId, table: TableName, completed: usize, total: usize) {
        let _ = self.send(SearchEvent::TableCompleted {
            shard_id,
            table,
            completed_tables: completed,
            total_tables: total,
        });
    }

    fn on_shard_complete(&self, shard_id: ShardId, completed: usize, total: usize) {
        let _ = self.send(SearchEvent::ShardCompleted {
            shard_id,
            completed_shards: completed,
            total_shards: total,
        });
    }

    fn on_complete(&self, summary: RunSummary) {
        let _ = self.send(SearchEvent::Completed(summary));
    }
}

/// Producer side of a run's delivery channel
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl EventSink {
    pub fn send(&self, event: SearchEvent) {
        // Delivery task gone means the run is being torn down
        let _ = self.tx.send(event);
    }
}

/// Create the channel and spawn the task that feeds `observer`
pub(crate) fn spawn_delivery(
    observer: Arc<dyn SearchObserver>,
    control: Arc<RunControl>,
) -> (EventSink, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(deliver(rx, observer, control));
    (EventSink { tx }, handle)
}

async fn deliver(
    mut rx: mpsc::UnboundedReceiver<SearchEvent>,
    observer: Arc<dyn SearchObserver>,
    control: Arc<RunControl>,
) {
    while let Some(event) = rx.recv().await {
        if event.suppressed_after_stop() && control.is_stopped() {
            continue;
        }

        match event {
            SearchEvent::Initialized {
                total_shards,
                total_tables,
            } => observer.on_initialize(total_shards, total_tables),
            SearchEvent::RowProgress {
                shard_id,
                table,
                current,
                total,
            } => observer.on_row_progress(shard_id, table, current, total),
            SearchEvent::Result(item) => observer.on_result(item),
            SearchEvent::TableCompleted {
                shard_id,
                table,
                completed_tables,
                total_tables,
            } => observer.on_table_complete(shard_id, table, completed_tables, total_tables),
            SearchEvent::ShardCompleted {
                shard_id,
                completed_shards,
                total_shards,
            } => observer.on_shard_complete(shard_id, completed_shards, total_shards),
            SearchEvent::Completed(summary) => {
                observer.on_complete(summary);
                break;
            }
        }
    }
}
