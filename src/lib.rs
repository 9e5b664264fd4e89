//! PantherOS - User Program Layer
//!
//! The part of the kernel that turns loaded programs into processes and
//! serves their system calls.
//!
//! # Responsibilities
//! - Syscall dispatch: decoding the call number and arguments from the
//!   user stack and routing to the handler
//! - User memory validation: every pointer, string and buffer a process
//!   hands in is proven accessible before use
//! - Process lifecycle: exec / wait / exit with a parent-child handshake
//!   that never frees state somebody can still observe
//! - Per-process file descriptors over a single-lock filesystem
//!
//! # Security Features
//! - A bad user pointer kills the caller, never the kernel
//! - Process state is found by [`Pid`] lookup, so no dangling references
//! - Executables cannot be written while they run
//!
//! # Platform
//! Threads, program loading, the filesystem, the console and page-fault
//! interception are supplied by the embedding kernel through
//! [`KernelServices`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod exception;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;

#[cfg(test)]
mod sim;

pub use config::KernelConfig;
pub use exception::{TrapCause, TrapDisposition, TrapFrame, UserContext};
pub use kernel::{Kernel, KernelServices};
pub use process::Pid;

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
