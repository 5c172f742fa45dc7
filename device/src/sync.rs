//! Events: completion tracking for queued actions.
//!
//! Every action submitted to a [`CommandQueue`](crate::queue::CommandQueue)
//! gets an [`Event`]. The event moves through
//! `Queued → Running → Complete | Failed(code)` and never leaves a terminal
//! state. Waiters block on a `parking_lot` condvar until it is terminal.
//!
//! # Example
//!
//! ```ignore
//! let event = queue.enqueue(action, &[])?;
//! event.wait()?;            // Block until the action finished
//! event.wait_timeout(100)?; // Or give up after 100ms
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use snafu::ensure;

use crate::error::{EventFailedSnafu, Result, RuntimeSnafu};

/// Execution status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Submitted, waiting for its turn or its dependencies.
    Queued,
    /// The action is executing.
    Running,
    /// The action finished successfully.
    Complete,
    /// The action failed, or was never run; carries a negative status code.
    Failed(i32),
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Completion event of one queued action.
pub struct Event {
    id: u64,
    status: Mutex<EventStatus>,
    condvar: Condvar,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("id", &self.id).field("status", &*self.status.lock()).finish()
    }
}

impl Event {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            status: Mutex::new(EventStatus::Queued),
            condvar: Condvar::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> EventStatus {
        *self.status.lock()
    }

    pub fn set_running(&self) {
        self.transition(EventStatus::Running);
    }

    pub fn complete(&self) {
        self.transition(EventStatus::Complete);
    }

    pub fn fail(&self, code: i32) {
        self.transition(EventStatus::Failed(code));
    }

    fn transition(&self, next: EventStatus) {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return;
        }
        *status = next;
        if next.is_terminal() {
            self.condvar.notify_all();
        }
    }

    fn outcome(&self, status: EventStatus) -> Result<()> {
        match status {
            EventStatus::Failed(code) => EventFailedSnafu { id: self.id, code }.fail(),
            _ => Ok(()),
        }
    }

    /// Block until the event is terminal.
    pub fn wait(&self) -> Result<()> {
        let mut status = self.status.lock();
        while !status.is_terminal() {
            self.condvar.wait(&mut status);
        }
        self.outcome(*status)
    }

    /// Wait up to `timeout` for a terminal status; `None` if the event is still pending.
    pub fn wait_for(&self, timeout: Duration) -> Option<EventStatus> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while !status.is_terminal() {
            if self.condvar.wait_until(&mut status, deadline).timed_out() {
                break;
            }
        }
        status.is_terminal().then_some(*status)
    }

    /// Block until the event is terminal or `timeout_ms` elapsed.
    pub fn wait_timeout(&self, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut status = self.status.lock();

        while !status.is_terminal() {
            let result = self.condvar.wait_until(&mut status, deadline);
            ensure!(
                !result.timed_out() || status.is_terminal(),
                RuntimeSnafu { message: format!("event {} timeout: waited {}ms", self.id, timeout_ms) }
            );
        }
        self.outcome(*status)
    }
}
