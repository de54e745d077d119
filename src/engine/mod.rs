//! Concurrent, cancellable, resumable full-text search over sharded SQLite
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │
//!   └──→ SearchEngine::start_search (one run at a time)
//!           │
//!           ├──→ run task ──→ ShardWorker (shard 1) ──→ TableScanner ──→ ShardPool slots
//!           │          └────→ ShardWorker (shard 2) ──→ ...              (sequential shards,
//!           │                                                             parallel windows)
//!           └──→ delivery task ──→ SearchObserver callbacks (single ordered channel)
//! ```
//!
//! Shards run one after another, so at most one shard's pool is busy at a
//! time. Stop, pause and resume act on the current run only.
//!
//! # Module Organization
//!
//! - `types` - Shards, tables, queries, rows and results
//! - `query` - FTS5 match-expression building
//! - `pool` - Slot-addressed connection pool per shard
//! - `gate` - Pause/resume barrier
//! - `scanner` - Partitioned scan of one table
//! - `worker` - Sequential walk of one shard's tables
//! - `events` - Run events and the delivery task
//! - `codec` - Stored text decoding
//! - `snippet` - Highlighted excerpts

pub mod codec;
mod events;
mod gate;
pub mod pool;
mod query;
mod run;
mod scanner;
mod snippet;
mod types;
mod worker;


pub use codec::{TextCodec, ZlibCodec};
pub use events::{RunSummary, SearchEvent, SearchObserver};
pub use gate::PauseGate;
pub use pool::{PoolError, ShardPool};
pub use query::MatchMode;
pub use scanner::{partition, ScanSettings, TableOutcome, Window};
pub use snippet::{SnippetRenderer, SnippetStyle};
pub use types::{
    AllowedTables, BookId, BookRecord, ContentRow, SearchQuery, SearchResultItem, ShardId,
    ShardInfo, TableName,
};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use run::RunControl;
use scanner::TableScanner;
use worker::{ShardWorker, WorkerExit};

/// Engine-wide settings; batch size is per registered shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub progress_every: usize,
    pub pause_check_every: usize,
    pub snippet: SnippetStyle,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let scan = ScanSettings::default();
        Self {
            progress_every: scan.progress_every,
            pause_check_every: scan.pause_check_every,
            snippet: SnippetStyle::default(),
        }
    }
}

/// Answer of `check_and_resume_if_needed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// A paused run was resumed; do not start another
    Resumed,
    /// Nothing to resume; the caller should start a fresh run
    NeedsNewRun,
}

struct Registration {
    info: Arc<ShardInfo>,
    pool: Arc<ShardPool>,
    batch_size: usize,
}

struct ActiveRun {
    control: Arc<RunControl>,
}

/// One shard as scheduled for a run
struct PlannedShard {
    info: Arc<ShardInfo>,
    pool: Arc<ShardPool>,
    batch_size: usize,
    tables: Vec<TableName>,
}

/// Search coordinator
///
/// Owns the registered shards and at most one live run. All methods take
/// `&self`; share the engine behind an `Arc`. `start_search` spawns onto the
/// current tokio runtime.
pub struct SearchEngine {
    shards: Mutex<BTreeMap<ShardId, Registration>>,
    current: Mutex<Option<ActiveRun>>,
    codec: Arc<dyn TextCodec>,
    settings: EngineSettings,
}

impl SearchEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            shards: Mutex::new(BTreeMap::new()),
            current: Mutex::new(None),
            codec: Arc::new(ZlibCodec),
            settings,
        }
    }

    /// Replace the stored-text codec
    pub fn with_codec(mut self, codec: Arc<dyn TextCodec>) -> Self {
        self.codec = codec;
        self
    }

    fn shards(&self) -> MutexGuard<'_, BTreeMap<ShardId, Registration>> {
        self.shards.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn current(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register (or replace) a shard with its pool and page size
    pub fn register_shard(&self, info: ShardInfo, pool: ShardPool, batch_size: usize) {
        let id = info.id;
        tracing::debug!(
            "Registering shard {} ({} tables, {} connections, batch {})",
            id,
            info.books().len(),
            pool.len(),
            batch_size
        );
        self.shards().insert(
            id,
            Registration {
                info: Arc::new(info),
                pool: Arc::new(pool),
                batch_size: batch_size.max(1),
            },
        );
    }

    pub fn unregister_shard(&self, id: ShardId) -> bool {
        self.shards().remove(&id).is_some()
    }

    pub fn registered_shards(&self) -> Vec<ShardId> {
        self.shards().keys().copied().collect()
    }

    /// Start a run, stopping any previous one first
    ///
    /// Returns false without touching the observer when the keyword list is
    /// empty.
    pub fn start_search(
        &self,
        query: SearchQuery,
        allowed: Option<AllowedTables>,
        observer: Arc<dyn SearchObserver>,
    ) -> bool {
        if query.is_empty() {
            tracing::debug!("Empty keyword list, search not started");
            return false;
        }

        let mut current = self.current();
        if let Some(previous) = current.take() {
            if previous.control.stop() {
                tracing::debug!("Previous search run discarded");
            }
        }

        let plan = self.plan(allowed.as_ref());
        let control = Arc::new(RunControl::new());
        let (sink, _delivery) = events::spawn_delivery(observer, control.clone());

        let expr: Arc<str> = query.fts_expression().into();
        let snippets = Arc::new(SnippetRenderer::new(
            query.keywords(),
            self.settings.snippet.clone(),
        ));

        tracing::info!(
            "Search started: mode={} expr={} shards={}",
            query.mode.as_str(),
            expr,
            plan.len()
        );

        let run = RunTask {
            plan,
            expr,
            control: control.clone(),
            sink,
            codec: self.codec.clone(),
            snippets,
            progress_every: self.settings.progress_every,
            pause_check_every: self.settings.pause_check_every,
        };
        tokio::spawn(run.execute());

        *current = Some(ActiveRun { control });
        true
    }

    fn plan(&self, allowed: Option<&AllowedTables>) -> Vec<PlannedShard> {
        self.shards()
            .values()
            .filter_map(|reg| {
                let tables = reg.info.eligible_tables(allowed);
                if tables.is_empty() {
                    return None;
                }
                if reg.pool.is_empty() {
                    tracing::warn!("Shard {} unavailable (no connections), skipping", reg.info.id);
                    return None;
                }
                Some(PlannedShard {
                    info: reg.info.clone(),
                    pool: reg.pool.clone(),
                    batch_size: reg.batch_size,
                    tables,
                })
            })
            .collect()
    }

    pub fn pause(&self) {
        if let Some(run) = self.current().as_ref() {
            run.control.gate().pause();
        }
    }

    pub fn resume(&self) {
        if let Some(run) = self.current().as_ref() {
            run.control.gate().resume();
        }
    }

    /// Stop the current run; safe to call repeatedly
    pub fn stop(&self) {
        if let Some(run) = self.current().as_ref() {
            if run.control.stop() {
                tracing::info!("Search stop requested");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|run| !run.control.is_finished() && !run.control.is_stopped())
    }

    pub fn is_paused(&self) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|run| !run.control.is_finished() && run.control.gate().is_paused())
    }

    /// Resume a paused run instead of starting a new one
    pub fn check_and_resume_if_needed(&self) -> ResumeOutcome {
        match self.current().as_ref() {
            Some(run) if !run.control.is_finished() && run.control.gate().is_paused() => {
                run.control.gate().resume();
                tracing::debug!("Paused search resumed");
                ResumeOutcome::Resumed
            }
            _ => ResumeOutcome::NeedsNewRun,
        }
    }
}

/// The run's top-level unit of work
struct RunTask {
    plan: Vec<PlannedShard>,
    expr: Arc<str>,
    control: Arc<RunControl>,
    sink: events::EventSink,
    codec: Arc<dyn TextCodec>,
    snippets: Arc<SnippetRenderer>,
    progress_every: usize,
    pause_check_every: usize,
}

impl RunTask {
    async fn execute(self) {
        let token = self.control.token().clone();
        let control = self.control.clone();
        let sink = self.sink.clone();

        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Search run cancelled");
            }
            _ = self.run_shards() => {}
        }

        control.set_active_pool(None);
        let summary = control.finish();
        tracing::info!(
            "Search finished: {} results, {}/{} tables, stopped={}",
            summary.results,
            summary.completed_tables,
            summary.total_tables,
            summary.stopped
        );
        sink.send(SearchEvent::Completed(summary));
    }

    async fn run_shards(self) {
        let total_tables = self.plan.iter().map(|s| s.tables.len()).sum();
        self.control.begin(self.plan.len(), total_tables);
        self.sink.send(SearchEvent::Initialized {
            total_shards: self.plan.len(),
            total_tables,
        });

        for shard in self.plan {
            if self.control.is_stopped() {
                break;
            }
            self.control.set_active_pool(Some(shard.pool.clone()));

            let worker = ShardWorker {
                info: shard.info,
                tables: shard.tables,
                scanner: TableScanner {
                    pool: shard.pool,
                    codec: self.codec.clone(),
                    snippets: self.snippets.clone(),
                    control: self.control.clone(),
                    sink: self.sink.clone(),
                    settings: ScanSettings {
                        batch_size: shard.batch_size,
                        progress_every: self.progress_every,
                        pause_check_every: self.pause_check_every,
                    },
                },
                control: self.control.clone(),
                sink: self.sink.clone(),
            };

            let exit = worker.run(self.expr.clone()).await;
            self.control.set_active_pool(None);
            if exit == WorkerExit::Stopped {
                break;
            }
        }
    }
}
