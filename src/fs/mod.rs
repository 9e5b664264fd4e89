//! File access for user processes
//!
//! The on-disk filesystem is a platform collaborator reached through the
//! [`FileSystem`] and [`OpenFile`] traits. This module adds what the
//! user-program layer owns on top of it:
//! - [`FileSystemLock`], the single lock serializing every filesystem call
//! - [`FdTable`], the per-process descriptor table
//!
//! # Locking
//! A process first takes its own descriptor table, then the filesystem
//! lock, and holds the latter for exactly one delegate call.

mod error;
mod fd;
mod lock;

use alloc::boxed::Box;

pub use error::{FdError, FdResult};
pub use fd::{Fd, FdTable, FIRST_FILE_FD, STDIN_FILENO, STDOUT_FILENO};
pub use lock::FileSystemLock;

/// Path-level operations of the underlying filesystem.
///
/// Callers always hold the [`FileSystemLock`]; implementations need not be
/// reentrant.
pub trait FileSystem: Send + Sync {
    /// Create a file of `initial_size` zero bytes. False if it exists or
    /// cannot be created.
    fn create(&self, name: &str, initial_size: u32) -> bool;

    /// Remove a file. Open handles stay usable until closed.
    fn remove(&self, name: &str) -> bool;

    /// Open a file, positioned at offset 0.
    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>>;
}

/// An open file. Dropping the handle closes it.
pub trait OpenFile: Send {
    /// Read from the current position. Returns the bytes read, 0 at EOF.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write at the current position. Files do not grow: writing stops at
    /// end of file, and a write-denied file accepts nothing.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// File length in bytes.
    fn length(&self) -> u32;

    /// Move the position. Seeking past EOF is allowed.
    fn seek(&mut self, position: u32);

    /// Current position.
    fn tell(&self) -> u32;

    /// Refuse writes to the underlying file until `allow_write`.
    fn deny_write(&mut self);

    /// Undo a previous `deny_write` through this handle.
    fn allow_write(&mut self);
}
