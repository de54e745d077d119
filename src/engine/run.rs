//! Per-run control block: stop flag, counters, gate, cancellation

use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::events::RunSummary;
use super::gate::PauseGate;
use super::pool::ShardPool;

#[derive(Debug, Default)]
struct RunState {
    stopped: bool,
    finished: bool,
    total_shards: usize,
    completed_shards: usize,
    total_tables: usize,
    completed_tables: usize,
    results: usize,
}

/// Shared by the coordinator, the run task, its workers and scanners
///
/// The stop flag and every counter sit behind one mutex: reads and writes of
/// `stopped` take the same lock, so a check that sees `false` happened before
/// the `stop()` that flips it.
pub(crate) struct RunControl {
    state: Mutex<RunState>,
    gate: PauseGate,
    token: CancellationToken,
    active_pool: Mutex<Option<Arc<ShardPool>>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::default()),
            gate: PauseGate::new(),
            token: CancellationToken::new(),
            active_pool: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        // Counters stay meaningful even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    /// Request stop; returns false if already stopped
    pub fn stop(&self) -> bool {
        {
            let mut state = self.state();
            if state.stopped {
                return false;
            }
            state.stopped = true;
        }

        self.gate.stop_and_resume_all();
        self.token.cancel();
        if let Some(pool) = self.active_pool().as_ref() {
            pool.interrupt_all();
        }
        true
    }

    fn active_pool(&self) -> MutexGuard<'_, Option<Arc<ShardPool>>> {
        self.active_pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pool currently being scanned, interrupted on stop
    pub fn set_active_pool(&self, pool: Option<Arc<ShardPool>>) {
        *self.active_pool() = pool;
    }

    pub fn begin(&self, total_shards: usize, total_tables: usize) {
        let mut state = self.state();
        state.total_shards = total_shards;
        state.total_tables = total_tables;
    }

    /// Returns (completed, total) after counting one more table
    pub fn complete_table(&self) -> (usize, usize) {
        let mut state = self.state();
        state.completed_tables += 1;
        (state.completed_tables, state.total_tables)
    }

    /// Returns (completed, total) after counting one more shard
    pub fn complete_shard(&self) -> (usize, usize) {
        let mut state = self.state();
        state.completed_shards += 1;
        (state.completed_shards, state.total_shards)
    }

    pub fn count_result(&self) {
        self.state().results += 1;
    }

    pub fn finish(&self) -> RunSummary {
        let mut state = self.state();
        state.finished = true;
        RunSummary {
            total_shards: state.total_shards,
            completed_shards: state.completed_shards,
            total_tables: state.total_tables,
            completed_tables: state.completed_tables,
            results: state.results,
            stopped: state.stopped,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }
}
