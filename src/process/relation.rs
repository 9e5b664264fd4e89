//! Parent/child rendezvous
//!
//! One `Relation` exists per parent/child edge and is shared by both ends.
//! It carries the three one-shot handshakes of the edge:
//!
//! ```text
//!  child                              parent
//!  ─────                              ──────
//!  publish_exec_outcome ──exec-ready──▶ await_exec_outcome
//!  publish_exit         ──exit-ready──▶ await_exit
//!  await_reap_ack      ◀───reap-ack──── acknowledge_reap / release
//! ```
//!
//! All state sits in one explicit enum-valued record behind a spinlock, so
//! the invariants are checked on the record instead of being implied by
//! semaphore counts:
//! - the exec outcome is published at most once, and never changes after
//! - the exit status is written in the same critical section that raises
//!   exit-ready, so a waiter can never see one without the other
//! - `waited` goes false → true exactly once
//! - the reap acknowledgment, once given, is never withdrawn

use spin::Mutex;

use super::Scheduler;

/// Result of the child's attempt to load its program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecOutcome {
    Pending,
    Loaded,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChildState {
    Running,
    Exited(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParentState {
    /// The parent may still want the exit status.
    Attached,
    /// The parent consumed the exit status through wait().
    Reaped,
    /// The parent exited, or never existed; nobody will read the status.
    Released,
}

#[derive(Debug)]
struct EdgeState {
    exec: ExecOutcome,
    child: ChildState,
    parent: ParentState,
    waited: bool,
}

/// Shared state of one parent/child edge.
#[derive(Debug)]
pub struct Relation {
    state: Mutex<EdgeState>,
}

impl Relation {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EdgeState {
                exec: ExecOutcome::Pending,
                child: ChildState::Running,
                parent: ParentState::Attached,
                waited: false,
            }),
        }
    }

    /// Block until `ready` yields a value, yielding the CPU between checks.
    ///
    /// This polls: the thread is never parked, so there is no wakeup to
    /// lose, at the cost of being rescheduled while it waits.
    fn block_until<T>(&self, sched: &dyn Scheduler, mut ready: impl FnMut(&mut EdgeState) -> Option<T>) -> T {
        loop {
            let value = {
                let mut state = self.state.lock();
                ready(&mut *state)
            };
            if let Some(value) = value {
                return value;
            }
            sched.yield_now();
        }
    }

    // ── child side ──

    /// Raise exec-ready. Only the first call has an effect.
    pub fn publish_exec_outcome(&self, loaded: bool) {
        let mut state = self.state.lock();
        if state.exec == ExecOutcome::Pending {
            state.exec = if loaded {
                ExecOutcome::Loaded
            } else {
                ExecOutcome::Failed
            };
        }
    }

    /// Store the exit status and raise exit-ready. Only the first call has
    /// an effect.
    pub fn publish_exit(&self, status: i32) {
        let mut state = self.state.lock();
        if state.child == ChildState::Running {
            state.child = ChildState::Exited(status);
        }
        // A child that exits before reporting its load result failed to load.
        if state.exec == ExecOutcome::Pending {
            state.exec = ExecOutcome::Failed;
        }
    }

    /// Block until the parent reaped or released this child.
    pub fn await_reap_ack(&self, sched: &dyn Scheduler) {
        self.block_until(sched, |state| {
            (state.parent != ParentState::Attached).then_some(())
        })
    }

    // ── parent side ──

    /// Block until the child reported whether its program loaded.
    pub fn await_exec_outcome(&self, sched: &dyn Scheduler) -> ExecOutcome {
        self.block_until(sched, |state| {
            (state.exec != ExecOutcome::Pending).then_some(state.exec)
        })
    }

    /// Claim the single wait() allowed on this child.
    ///
    /// Returns false if it was already claimed.
    pub fn begin_wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.waited {
            return false;
        }
        state.waited = true;
        true
    }

    /// Block until exit-ready, then return the exit status.
    ///
    /// Returns immediately if the child already exited.
    pub fn await_exit(&self, sched: &dyn Scheduler) -> i32 {
        self.block_until(sched, |state| match state.child {
            ChildState::Exited(status) => Some(status),
            ChildState::Running => None,
        })
    }

    /// The parent consumed the exit status.
    pub fn acknowledge_reap(&self) {
        let mut state = self.state.lock();
        if state.parent == ParentState::Attached {
            state.parent = ParentState::Reaped;
        }
    }

    /// Nobody will consume the exit status: the parent is exiting, or the
    /// child is an orphan acknowledging itself.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.parent == ParentState::Attached {
            state.parent = ParentState::Released;
        }
    }

    // ── inspection ──

    pub fn exec_outcome(&self) -> ExecOutcome {
        self.state.lock().exec
    }

    /// The exit status, once exit-ready has been raised.
    pub fn exit_status(&self) -> Option<i32> {
        match self.state.lock().child {
            ChildState::Exited(status) => Some(status),
            ChildState::Running => None,
        }
    }

    pub fn is_waited(&self) -> bool {
        self.state.lock().waited
    }

    /// True once the parent reaped or released the child.
    pub fn is_acknowledged(&self) -> bool {
        self.state.lock().parent != ParentState::Attached
    }
}

impl Default for Relation {
    fn default() -> Self {
        Self::new()
    }
}
