//! Kernel instance
//!
//! Ties the user-program layer to the platform services it consumes. Built
//! once at boot; the filesystem lock and process table exist before the
//! first process does.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::KernelConfig;
use crate::drivers::{Console, ConsoleDevice};
use crate::fs::{FileSystem, FileSystemLock};
use crate::process::{Loader, ProcessTable, Scheduler};

/// Platform services handed to [`Kernel::new`].
pub struct KernelServices {
    pub scheduler: Arc<dyn Scheduler>,
    pub loader: Arc<dyn Loader>,
    pub filesystem: Arc<dyn FileSystem>,
    pub console: Box<dyn ConsoleDevice>,
}

pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) loader: Arc<dyn Loader>,
    pub(crate) fs: FileSystemLock,
    pub(crate) console: Console,
    pub(crate) processes: ProcessTable,
    halted: AtomicBool,
}

impl Kernel {
    pub fn new(config: KernelConfig, services: KernelServices) -> Arc<Self> {
        let config = config.sanitized();
        log::info!(
            "[BOOT] user-program layer up ({} fds per process)",
            config.fd_capacity
        );
        Arc::new(Self {
            config,
            scheduler: services.scheduler,
            loader: services.loader,
            fs: FileSystemLock::new(services.filesystem),
            console: Console::new(services.console),
            processes: ProcessTable::new(),
            halted: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn filesystem(&self) -> &FileSystemLock {
        &self.fs
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    /// Power off through the scheduler.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            log::info!("[BOOT] halt requested, powering off");
            self.scheduler.power_off();
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}
