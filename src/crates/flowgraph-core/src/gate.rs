//! The interactive step-debugger primitive: a cooperative suspension point
//! the runtime waits on immediately before invoking a node's body, driven
//! from outside by a debugger UI.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{FlowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Paused,
    SteppingOnce,
}

/// Default open. `pause` blocks subsequent waiters until `resume` or
/// `step_once`; `step_once` admits exactly one waiter and re-closes.
pub struct Gate {
    state: Mutex<GateState>,
    notify: Notify,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self { state: Mutex::new(GateState::Open), notify: Notify::new() }
    }

    pub fn pause(&self) {
        *self.state.lock() = GateState::Paused;
    }

    pub fn resume(&self) {
        *self.state.lock() = GateState::Open;
        self.notify.notify_waiters();
    }

    /// Admit exactly one waiter, then return to the paused state.
    pub fn step_once(&self) {
        {
            let mut state = self.state.lock();
            if *state == GateState::Paused {
                *state = GateState::SteppingOnce;
            }
        }
        self.notify.notify_one();
    }

    pub fn is_open(&self) -> bool {
        *self.state.lock() == GateState::Open
    }

    /// Called by the runtime before invoking a node's body. Cancellable.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            {
                let mut state = self.state.lock();
                match *state {
                    GateState::Open => return Ok(()),
                    GateState::SteppingOnce => {
                        *state = GateState::Paused;
                        return Ok(());
                    }
                    GateState::Paused => {}
                }
            }
            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = cancel.cancelled() => return Err(FlowError::Canceled),
            }
        }
    }
}
