//! Sequential walk over one shard's tables

use std::sync::Arc;

use super::events::{EventSink, SearchEvent};
use super::run::RunControl;
use super::scanner::TableScanner;
use super::types::{ShardInfo, TableName};

/// Why a worker returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Exhausted,
    Stopped,
}

pub(crate) struct ShardWorker {
    pub info: Arc<ShardInfo>,
    pub tables: Vec<TableName>,
    pub scanner: TableScanner,
    pub control: Arc<RunControl>,
    pub sink: EventSink,
}

impl ShardWorker {
    pub async fn run(&self, expr: Arc<str>) -> WorkerExit {
        let shard = self.info.id;

        for &table in &self.tables {
            if self.control.is_stopped() {
                return WorkerExit::Stopped;
            }
            self.control.gate().wait_if_paused().await;
            if self.control.is_stopped() {
                return WorkerExit::Stopped;
            }

            let title = self.info.title_of(table).unwrap_or_default();
            let outcome = self.scanner.scan(table, title, expr.clone()).await;

            // A stop raised mid-table must not let this table count as done
            if outcome.stopped || self.control.is_stopped() {
                return WorkerExit::Stopped;
            }

            let (completed, total) = self.control.complete_table();
            tracing::debug!(
                "Shard {} table {} complete: {} rows ({}/{})",
                shard,
                table,
                outcome.delivered,
                completed,
                total
            );
            self.sink.send(SearchEvent::TableCompleted {
                shard_id: shard,
                table,
                completed_tables: completed,
                total_tables: total,
            });
        }

        let (completed, total) = self.control.complete_shard();
        self.sink.send(SearchEvent::ShardCompleted {
            shard_id: shard,
            completed_shards: completed,
            total_shards: total,
        });
        WorkerExit::Exhausted
    }
}
