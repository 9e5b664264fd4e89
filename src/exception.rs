//! Kernel entry from user mode
//!
//! The trap entry assembly saves user state into a [`TrapFrame`] and hands
//! it, together with the cause, to [`UserContext::trap`]. Only the two
//! registers the syscall ABI uses are modelled here.
//!
//! # Syscall ABI
//! ```text
//! esp + 12 ┌───────────┐
//!          │ arg 2     │
//! esp + 8  ├───────────┤
//!          │ arg 1     │
//! esp + 4  ├───────────┤
//!          │ arg 0     │
//! esp      ├───────────┤
//!          │ call no.  │
//!          └───────────┘
//! ```
//! The result, if any, is returned in `eax`.
//!
//! # Security Considerations
//! - Every trap from user mode either resumes the same process or ends it
//! - A fault raised by user code kills only that process

use alloc::sync::Arc;

use crate::kernel::Kernel;
use crate::mm::{UserAddr, UserMemory};
use crate::process::{Pcb, Pid};
use crate::syscall;

/// User register state saved at kernel entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    /// User stack pointer at the time of the trap.
    pub esp: u32,
    /// Syscall result register.
    pub eax: u32,
}

impl TrapFrame {
    pub const fn new(esp: u32) -> Self {
        Self { esp, eax: 0 }
    }

    /// Store a syscall return value.
    #[inline]
    pub fn set_result(&mut self, value: i32) {
        self.eax = value as u32;
    }

    /// The return value as user code sees it.
    #[inline]
    pub fn result(&self) -> i32 {
        self.eax as i32
    }
}

/// Why user code entered the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// `int 0x30` / `svc`: a system call.
    Syscall,
    /// User code touched an address it may not access.
    PageFault(UserAddr),
    /// Any other exception raised by user code.
    Other(u32),
}

/// What the trap return path does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapDisposition {
    /// Return to user mode with the (possibly updated) frame.
    Resume,
    /// The process is gone; its thread must not return to user mode.
    Exited,
    /// The machine is powering off.
    Halted,
}

/// Kernel-side handle of a running process, used by its thread for every
/// kernel entry.
pub struct UserContext {
    kernel: Arc<Kernel>,
    pcb: Arc<Pcb>,
    memory: Arc<dyn UserMemory>,
}

impl UserContext {
    pub(crate) fn new(kernel: Arc<Kernel>, pcb: Arc<Pcb>, memory: Arc<dyn UserMemory>) -> Self {
        Self {
            kernel,
            pcb,
            memory,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pcb.pid()
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Handle one entry from user mode.
    pub fn trap(&self, cause: TrapCause, frame: &mut TrapFrame) -> TrapDisposition {
        if self.pcb.is_completed() {
            return TrapDisposition::Exited;
        }

        match cause {
            TrapCause::Syscall => {
                syscall::dispatch(&self.kernel, &self.pcb, self.memory.as_ref(), frame)
            }
            TrapCause::PageFault(addr) => {
                log::warn!("[EXCEPTION] pid {} page fault at {}", self.pid(), addr);
                self.kernel.exit(&self.pcb, -1);
                TrapDisposition::Exited
            }
            TrapCause::Other(code) => {
                log::warn!("[EXCEPTION] pid {} unhandled exception {:#x}", self.pid(), code);
                self.kernel.exit(&self.pcb, -1);
                TrapDisposition::Exited
            }
        }
    }

    /// Shorthand for a syscall trap.
    pub fn syscall(&self, frame: &mut TrapFrame) -> TrapDisposition {
        self.trap(TrapCause::Syscall, frame)
    }
}
