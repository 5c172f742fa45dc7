//! In-order command queue.
//!
//! A [`CommandQueue`] owns one worker thread. Submitted actions run strictly
//! in submission order; each one first waits for every event in its wait
//! list, then runs to completion on the worker. Separate queues run
//! concurrently.
//!
//! # Design
//!
//! ```text
//! enqueue(action, wait_list) ──► pending ──► worker: wait deps ─► execute ─► event
//! ```
//!
//! - A failed dependency fails the action's event without running it.
//! - The action's result becomes the event's terminal state.
//! - Dropping the queue abandons actions that have not started, including one
//!   still waiting on its dependencies; their events fail with
//!   [`status::INVALID_OPERATION`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::device::Device;
use crate::error::{QueueClosedSnafu, Result, status};
use crate::sync::{Event, EventStatus};

/// How often a worker blocked on dependencies re-checks for queue teardown.
const DEPENDENCY_POLL: Duration = Duration::from_millis(5);

/// A unit of queued work with a single entry point, invoked at most once.
pub trait EventAction: Send + fmt::Debug {
    /// Run the action to completion.
    fn execute(self: Box<Self>) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &str;
}

enum Readiness {
    Ready,
    DependencyFailed(u64),
    Closed,
}

struct Command {
    action: Box<dyn EventAction>,
    wait_list: Vec<Arc<Event>>,
    event: Arc<Event>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Command>,
    /// Whether the worker is executing a command right now.
    active: bool,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    /// Signalled on new work, on completion and on close.
    condvar: Condvar,
}

/// In-order command queue driving actions on one worker thread.
pub struct CommandQueue {
    device: Arc<Device>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("CommandQueue")
            .field("device", &self.device.name)
            .field("pending", &state.pending.len())
            .field("active", &state.active)
            .finish()
    }
}

impl CommandQueue {
    pub fn new(device: Arc<Device>) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name(format!("ndlaunch-queue-{}", device.name))
                .spawn(move || Self::run(&shared))
                .ok()
        };
        if worker.is_none() {
            error!(device = %device.name, "failed to spawn queue worker");
            shared.state.lock().closed = true;
        }
        Self { device, shared, worker }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Queue `action` behind every previously submitted action and `wait_list`.
    pub fn enqueue(&self, action: Box<dyn EventAction>, wait_list: &[Arc<Event>]) -> Result<Arc<Event>> {
        let event = Event::new();
        let mut state = self.shared.state.lock();
        if state.closed {
            return QueueClosedSnafu.fail();
        }

        debug!(action = action.name(), event = event.id(), deps = wait_list.len(), "action queued");
        state.pending.push_back(Command { action, wait_list: wait_list.to_vec(), event: Arc::clone(&event) });
        self.shared.condvar.notify_all();
        Ok(event)
    }

    /// Block until every submitted action has finished.
    pub fn finish(&self) {
        let mut state = self.shared.state.lock();
        while (!state.pending.is_empty() || state.active) && !state.closed {
            self.shared.condvar.wait(&mut state);
        }
    }

    /// Number of submitted actions that have not started.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    fn run(shared: &Shared) {
        loop {
            let command = {
                let mut state = shared.state.lock();
                while state.pending.is_empty() && !state.closed {
                    shared.condvar.wait(&mut state);
                }
                if state.closed {
                    for abandoned in state.pending.drain(..) {
                        warn!(action = abandoned.action.name(), event = abandoned.event.id(), "action abandoned");
                        abandoned.event.fail(status::INVALID_OPERATION);
                    }
                    shared.condvar.notify_all();
                    return;
                }
                let Some(command) = state.pending.pop_front() else { continue };
                state.active = true;
                command
            };

            Self::execute(shared, command);

            shared.state.lock().active = false;
            shared.condvar.notify_all();
        }
    }

    fn await_dependencies(shared: &Shared, wait_list: &[Arc<Event>]) -> Readiness {
        for dep in wait_list {
            loop {
                match dep.wait_for(DEPENDENCY_POLL) {
                    Some(EventStatus::Failed(_)) => return Readiness::DependencyFailed(dep.id()),
                    Some(_) => break,
                    None if shared.state.lock().closed => return Readiness::Closed,
                    None => {}
                }
            }
        }
        Readiness::Ready
    }

    fn execute(shared: &Shared, command: Command) {
        let Command { action, wait_list, event } = command;

        match Self::await_dependencies(shared, &wait_list) {
            Readiness::Ready => {}
            Readiness::DependencyFailed(dependency) => {
                warn!(action = action.name(), event = event.id(), dependency, "dependency failed");
                event.fail(status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST);
                return;
            }
            Readiness::Closed => {
                warn!(action = action.name(), event = event.id(), "action abandoned while waiting on dependencies");
                event.fail(status::INVALID_OPERATION);
                return;
            }
        }

        event.set_running();
        let name = action.name().to_string();
        match action.execute() {
            Ok(()) => {
                debug!(action = %name, event = event.id(), "action complete");
                event.complete();
            }
            Err(e) => {
                let code = e.status_code();
                error!(action = %name, event = event.id(), code, error = %e, "action failed");
                event.fail(code);
            }
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.condvar.notify_all();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!(device = %self.device.name, "queue worker panicked");
        }
    }
}
