//! Process Control Block
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          Pcb                             │
//! ├──────────────────────────────────────────────────────────┤
//! │  pid / parent_pid     - identity, parent by lookup key   │
//! │  exit_status          - Some once exit() recorded it     │
//! │  parent_link          - edge shared with the parent      │
//! │  children             - edges shared with each child     │
//! │  fd_table             - open files, never inherited      │
//! │  executable           - image file, write-denied         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The locks here are uncontended: apart from the registry, only the
//! process's own thread touches its PCB. They exist because the PCB is
//! reachable from the process table.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use super::{Pid, Relation};
use crate::fs::{FdTable, OpenFile};

/// A parent's end of one parent/child edge.
#[derive(Debug, Clone)]
pub struct ChildLink {
    pub pid: Pid,
    pub relation: Arc<Relation>,
}

/// Per-process record.
pub struct Pcb {
    pid: Pid,
    parent_pid: Pid,
    name: String,
    exit_status: Mutex<Option<i32>>,
    parent_link: Arc<Relation>,
    children: Mutex<Vec<ChildLink>>,
    fd_table: Mutex<FdTable>,
    executable: Mutex<Option<Box<dyn OpenFile>>>,
}

impl Pcb {
    pub fn new(pid: Pid, parent_pid: Pid, name: &str, fd_capacity: usize) -> Self {
        Self {
            pid,
            parent_pid,
            name: String::from(name),
            exit_status: Mutex::new(None),
            parent_link: Arc::new(Relation::new()),
            children: Mutex::new(Vec::new()),
            fd_table: Mutex::new(FdTable::new(fd_capacity)),
            executable: Mutex::new(None),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Pid of the creator, or [`Pid::KERNEL`].
    #[inline]
    pub fn parent_pid(&self) -> Pid {
        self.parent_pid
    }

    /// Program name (first word of the command line).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Edge to the parent.
    pub fn relation(&self) -> &Arc<Relation> {
        &self.parent_link
    }

    // ── exit state ──

    /// Record the exit status. Returns false if exit already ran.
    pub(crate) fn record_exit(&self, status: i32) -> bool {
        let mut exit_status = self.exit_status.lock();
        if exit_status.is_some() {
            return false;
        }
        *exit_status = Some(status);
        true
    }

    pub fn exit_status(&self) -> Option<i32> {
        *self.exit_status.lock()
    }

    pub fn is_completed(&self) -> bool {
        self.exit_status.lock().is_some()
    }

    // ── children ──

    pub(crate) fn add_child(&self, link: ChildLink) {
        self.children.lock().push(link);
    }

    /// Edge to the direct child `pid`, if there is one.
    pub fn child(&self, pid: Pid) -> Option<Arc<Relation>> {
        self.children
            .lock()
            .iter()
            .find(|link| link.pid == pid)
            .map(|link| link.relation.clone())
    }

    pub(crate) fn remove_child(&self, pid: Pid) -> Option<ChildLink> {
        let mut children = self.children.lock();
        let index = children.iter().position(|link| link.pid == pid)?;
        Some(children.swap_remove(index))
    }

    pub(crate) fn take_children(&self) -> Vec<ChildLink> {
        core::mem::take(&mut *self.children.lock())
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().len()
    }

    // ── resources ──

    /// The descriptor table. Hold the guard only for one operation.
    pub fn fd_table(&self) -> MutexGuard<'_, FdTable> {
        self.fd_table.lock()
    }

    pub(crate) fn set_executable(&self, file: Option<Box<dyn OpenFile>>) {
        *self.executable.lock() = file;
    }

    pub(crate) fn take_executable(&self) -> Option<Box<dyn OpenFile>> {
        self.executable.lock().take()
    }
}

impl core::fmt::Debug for Pcb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pcb")
            .field("pid", &self.pid)
            .field("parent_pid", &self.parent_pid)
            .field("name", &self.name)
            .field("exit_status", &self.exit_status())
            .finish()
    }
}
