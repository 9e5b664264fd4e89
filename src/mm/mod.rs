//! User memory access for PantherOS
//!
//! Provides:
//! - `UserAddr`, the address type for untrusted user pointers
//! - `UserMemory`, the fault-tolerant access capability the platform
//!   supplies for each process address space
//!
//! # Security Principles
//! - The kernel never forms a reference into user memory
//! - Every access can fail; a fault is an ordinary `Err`, never a kernel
//!   exception
//! - Page tables and fault interception belong to the platform, this layer
//!   only consumes the capability

mod address;

use core::fmt;

use bitflags::bitflags;

pub use address::{UserAddr, PAGE_SIZE, PHYS_BASE, WORD_SIZE};

bitflags! {
    /// Kind of access a probe must prove is possible.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Access: u8 {
        /// The kernel will read from the address.
        const READ = 1 << 0;
        /// The kernel will store into the address.
        const WRITE = 1 << 1;
    }
}

/// A user memory access that would have page-faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// Address of the first byte that could not be accessed.
    pub addr: UserAddr,
    /// Access that was attempted.
    pub access: Access,
}

impl Fault {
    pub const fn new(addr: UserAddr, access: Access) -> Self {
        Self { addr, access }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.access.contains(Access::WRITE) {
            "write"
        } else {
            "read"
        };
        write!(f, "user {} fault at {}", kind, self.addr)
    }
}

/// Fault-tolerant access to one process's user address space.
///
/// Implemented by the platform, either by intercepting the page fault
/// the access raises or by walking the page table first. Every method
/// must return `Err(Fault)` instead of crashing the kernel.
pub trait UserMemory: Send + Sync {
    /// Probe a single byte.
    ///
    /// With `Access::READ` the byte is read and returned. With
    /// `Access::WRITE` the platform additionally proves that the byte is
    /// writable, without modifying it.
    fn probe(&self, addr: UserAddr, access: Access) -> Result<u8, Fault>;

    /// Copy `buf.len()` bytes starting at `addr` into `buf`.
    fn read_bytes(&self, addr: UserAddr, buf: &mut [u8]) -> Result<(), Fault>;

    /// Copy `data` into user memory starting at `addr`.
    fn write_bytes(&self, addr: UserAddr, data: &[u8]) -> Result<(), Fault>;

    /// Read one little-endian syscall ABI word.
    fn read_word(&self, addr: UserAddr) -> Result<u32, Fault> {
        let mut word = [0u8; WORD_SIZE];
        self.read_bytes(addr, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }
}
