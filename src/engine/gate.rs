//! Cooperative pause/resume barrier shared by every task of one run

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Running,
    Paused,
    /// Shutdown: nobody blocks again and `pause` is ignored
    Released,
}

/// Suspend/resume barrier
///
/// The state lives in a `watch` channel, so it is level-triggered: a waiter
/// that arrives after `resume` sees `Running` and passes straight through,
/// and every task parked in `wait_if_paused` wakes on the same state change.
#[derive(Debug, Clone)]
pub struct PauseGate {
    state: Arc<watch::Sender<GateState>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Running);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn pause(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Running {
                *state = GateState::Paused;
                true
            } else {
                false
            }
        });
    }

    pub fn resume(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Paused {
                *state = GateState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Release every waiter for shutdown; later `pause` calls are no-ops
    pub fn stop_and_resume_all(&self) {
        self.state.send_replace(GateState::Released);
    }

    pub fn is_paused(&self) -> bool {
        *self.state.borrow() == GateState::Paused
    }

    /// Suspension point: returns immediately unless paused
    pub async fn wait_if_paused(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|state| *state != GateState::Paused).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
