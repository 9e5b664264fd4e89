//! Process management
//!
//! Owns the process control block and the protocol that decides when a
//! process's state may be destroyed.
//!
//! # Design
//! - Processes are looked up by [`Pid`] in the [`ProcessTable`]; a PCB never
//!   holds a pointer to another PCB
//! - Each parent/child edge is one [`Relation`] object shared by both
//!   ends, exposing the exec / exit / reap handshake as named operations
//! - Creating threads, loading images and powering off are platform
//!   services reached through [`Scheduler`] and [`Loader`]
//!
//! # Lifecycle
//! ```text
//! RUNNING ──exit()──▶ EXITED_AWAITING_SYNC ──reap ack──▶ REAPED
//!                      (children exited, exit-ready raised)
//! ```

mod lifecycle;
mod pcb;
mod relation;
mod table;

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use crate::exception::UserContext;
use crate::fs::{FileSystemLock, OpenFile};
use crate::mm::UserMemory;

pub use pcb::{ChildLink, Pcb};
pub use relation::{ExecOutcome, Relation};
pub use table::ProcessTable;

/// Process identifier.
///
/// Allocated from a counter that never wraps back to a live value, so a
/// pid is a stable lookup key for as long as anything refers to it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Parent sentinel for processes started by the kernel itself.
    pub const KERNEL: Self = Self(0);

    /// First pid handed to a user process.
    pub const FIRST: Self = Self(1);

    /// Last pid that can be handed out; every pid is a positive `i32` in
    /// user code.
    pub const MAX: Self = Self(i32::MAX as u32);

    /// Interpret a pid passed in by user code.
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The value returned to user code.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    /// The following pid, or None past [`Pid::MAX`].
    #[inline]
    pub(crate) const fn next(self) -> Option<Self> {
        if self.0 < Self::MAX.0 {
            Some(Self(self.0 + 1))
        } else {
            None
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread scheduler services.
pub trait Scheduler: Send + Sync {
    /// Start a new kernel thread running `entry`. The thread's scheduling
    /// context is torn down when `entry` returns.
    fn spawn(&self, name: &str, entry: Box<dyn FnOnce() + Send + 'static>) -> Result<(), SpawnError>;

    /// Give up the CPU.
    ///
    /// Blocking in this layer is polled: every exec/exit/reap handshake
    /// rechecks its condition and calls `yield_now` until it holds, so a
    /// blocked thread stays runnable for as long as it waits. Schedulers
    /// should put the caller at the back of the run queue rather than
    /// return straight to it.
    fn yield_now(&self);

    /// Power the machine off.
    fn power_off(&self);
}

/// Executable loader.
pub trait Loader: Send + Sync {
    /// Build the address space for `cmdline` (program name followed by its
    /// arguments). Runs on the new process's own thread, before it has
    /// reported its exec outcome.
    ///
    /// A loader that opens the executable should deny writes to it; the
    /// handle is closed, and writes re-allowed, when the process exits.
    fn load(&self, cmdline: &str, fs: &FileSystemLock) -> Result<LoadedImage, LoadError>;
}

/// A successfully loaded program.
pub struct LoadedImage {
    /// The new address space.
    pub memory: Arc<dyn UserMemory>,
    /// The executable file, kept open while the process runs.
    pub executable: Option<Box<dyn OpenFile>>,
    /// Entry into user mode.
    pub program: Box<dyn UserProgram>,
}

/// User code of a loaded process.
pub trait UserProgram: Send {
    /// Run until the process exits. Every kernel entry goes through `ctx`;
    /// once a trap reports the process gone, `run` must return.
    fn run(self: Box<Self>, ctx: &UserContext);
}

/// Thread creation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No memory for a thread or its stack.
    OutOfResources,
    /// Every pid has been handed out.
    OutOfPids,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfResources => write!(f, "out of thread resources"),
            Self::OutOfPids => write!(f, "pid space exhausted"),
        }
    }
}

/// The loader could not build a process image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// No executable with that name.
    NotFound,
    /// The file exists but is not a loadable image.
    BadImage,
    /// Not enough memory for the address space.
    OutOfMemory,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "executable not found"),
            Self::BadImage => write!(f, "not a loadable image"),
            Self::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

/// exec() failed; user code sees -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    Spawn(SpawnError),
    /// The child started but could not load its image.
    LoadFailed,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "spawn failed: {}", err),
            Self::LoadFailed => write!(f, "child failed to load"),
        }
    }
}

impl From<SpawnError> for ExecError {
    fn from(err: SpawnError) -> Self {
        Self::Spawn(err)
    }
}

/// wait() rejected; user code sees -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Not a direct child of the caller.
    NotAChild(Pid),
    /// The caller already waited on this child.
    AlreadyWaited(Pid),
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAChild(pid) => write!(f, "pid {} is not a child", pid),
            Self::AlreadyWaited(pid) => write!(f, "pid {} already waited for", pid),
        }
    }
}
