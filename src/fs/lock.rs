//! Filesystem serialization lock
//!
//! The underlying filesystem is not safe for concurrent use, so every call
//! into it, path-level or through an open handle, runs under this one
//! lock. It is created with the kernel, before the first process exists,
//! and lives as long as the kernel does.

use alloc::boxed::Box;
use alloc::sync::Arc;
use spin::Mutex;

use super::{FileSystem, OpenFile};

/// The filesystem together with the lock guarding it.
pub struct FileSystemLock {
    fs: Arc<dyn FileSystem>,
    lock: Mutex<()>,
}

impl FileSystemLock {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            lock: Mutex::new(()),
        }
    }

    /// Run one path-level operation under the lock.
    pub fn with_fs<R>(&self, op: impl FnOnce(&dyn FileSystem) -> R) -> R {
        let _guard = self.lock.lock();
        op(self.fs.as_ref())
    }

    /// Run one operation on an open handle under the lock.
    pub fn with_file<R>(
        &self,
        file: &mut dyn OpenFile,
        op: impl FnOnce(&mut dyn OpenFile) -> R,
    ) -> R {
        let _guard = self.lock.lock();
        op(file)
    }

    /// Close a handle under the lock.
    pub fn close(&self, file: Box<dyn OpenFile>) {
        let _guard = self.lock.lock();
        drop(file);
    }
}
