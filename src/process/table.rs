//! Process registry
//!
//! Maps pids to live PCBs. A PCB enters the table before its thread starts
//! and leaves it as the very last step of exit, after both halves of the
//! termination handshake completed.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::{Pcb, Pid};

pub struct ProcessTable {
    inner: Mutex<Inner>,
}

struct Inner {
    procs: BTreeMap<Pid, Arc<Pcb>>,
    /// None once the pid space is used up.
    next_pid: Option<Pid>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                procs: BTreeMap::new(),
                next_pid: Some(Pid::FIRST),
            }),
        }
    }

    /// Reserve a fresh pid. Pids are never handed out twice, so this
    /// returns None after [`Pid::MAX`].
    pub fn allocate_pid(&self) -> Option<Pid> {
        let mut inner = self.inner.lock();
        let pid = inner.next_pid?;
        inner.next_pid = pid.next();
        Some(pid)
    }

    pub fn insert(&self, pcb: Arc<Pcb>) {
        let pid = pcb.pid();
        let previous = self.inner.lock().procs.insert(pid, pcb);
        debug_assert!(previous.is_none(), "pid {} registered twice", pid);
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Pcb>> {
        self.inner.lock().procs.get(&pid).cloned()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.inner.lock().procs.contains_key(&pid)
    }

    pub fn remove(&self, pid: Pid) -> Option<Arc<Pcb>> {
        self.inner.lock().procs.remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pids of every live process, in ascending order.
    pub fn pids(&self) -> Vec<Pid> {
        self.inner.lock().procs.keys().copied().collect()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
