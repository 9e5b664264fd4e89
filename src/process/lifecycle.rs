//! exec / wait / exit
//!
//! # Termination handshake
//! A process's state is released only when nobody can still need it:
//! 1. exit records the status and frees process-private resources
//! 2. it waits for every child still running to raise exit-ready, and
//!    releases each one as it arrives
//! 3. it raises its own exit-ready
//! 4. it waits for the parent's reap-ack; an orphan acknowledges itself
//! 5. it leaves the process table
//!
//! Every block has a matching signal that is always eventually raised:
//! children always reach exit, exiting parents release their children, and
//! the kernel reaps the initial process.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

use super::{ChildLink, ExecError, ExecOutcome, LoadedImage, Pcb, Pid, SpawnError, WaitError};
use crate::exception::UserContext;
use crate::kernel::Kernel;

/// Program name: first word of the command line.
fn program_name(cmdline: &str) -> &str {
    cmdline.split_whitespace().next().unwrap_or("")
}

impl Kernel {
    /// Allocate and register a PCB linked to `parent`.
    fn create_process(&self, parent: Pid, name: &str) -> Result<Arc<Pcb>, SpawnError> {
        let Some(pid) = self.processes.allocate_pid() else {
            log::warn!("[PROCESS] no pid left for '{}'", name);
            return Err(SpawnError::OutOfPids);
        };
        let pcb = Arc::new(Pcb::new(pid, parent, name, self.config.fd_capacity));
        self.processes.insert(pcb.clone());
        Ok(pcb)
    }

    /// Give the new process a thread. On failure the PCB is unregistered.
    fn start_process(self: &Arc<Self>, pcb: &Arc<Pcb>, cmdline: &str) -> Result<(), SpawnError> {
        let kernel = self.clone();
        let child = pcb.clone();
        let cmdline = String::from(cmdline);
        let started = self.scheduler.spawn(
            pcb.name(),
            Box::new(move || kernel.run_process(child, cmdline)),
        );
        if let Err(err) = started {
            log::warn!("[PROCESS] could not start '{}': {}", pcb.name(), err);
            self.processes.remove(pcb.pid());
            return Err(err);
        }
        Ok(())
    }

    /// Body of every process thread.
    fn run_process(self: Arc<Self>, pcb: Arc<Pcb>, cmdline: String) {
        let image = match self.loader.load(&cmdline, &self.fs) {
            Ok(image) => image,
            Err(err) => {
                log::debug!("[PROCESS] load of '{}' failed: {}", cmdline, err);
                pcb.relation().publish_exec_outcome(false);
                self.exit(&pcb, -1);
                return;
            }
        };

        let LoadedImage {
            memory,
            executable,
            program,
        } = image;
        pcb.set_executable(executable);
        pcb.relation().publish_exec_outcome(true);
        log::debug!("[PROCESS] pid {} running '{}'", pcb.pid(), cmdline);

        let ctx = UserContext::new(self.clone(), pcb.clone(), memory);
        program.run(&ctx);

        // User code returned without exiting.
        if !pcb.is_completed() {
            self.exit(&pcb, -1);
        }
    }

    /// Start a child running `cmdline` and return its pid once it has
    /// loaded. Blocks until the child reports its load result.
    pub fn exec(self: &Arc<Self>, parent: &Pcb, cmdline: &str) -> Result<Pid, ExecError> {
        let child = self.create_process(parent.pid(), program_name(cmdline))?;
        let pid = child.pid();
        let relation = child.relation().clone();
        parent.add_child(ChildLink {
            pid,
            relation: relation.clone(),
        });

        if let Err(err) = self.start_process(&child, cmdline) {
            parent.remove_child(pid);
            return Err(err.into());
        }
        drop(child);

        match relation.await_exec_outcome(self.scheduler.as_ref()) {
            ExecOutcome::Loaded => Ok(pid),
            _ => {
                // Reap the failed child here; its pid never reaches user code.
                relation.begin_wait();
                relation.await_exit(self.scheduler.as_ref());
                relation.acknowledge_reap();
                parent.remove_child(pid);
                Err(ExecError::LoadFailed)
            }
        }
    }

    /// Wait for direct child `pid` to exit and return its status.
    ///
    /// Fails without blocking if `pid` is not a direct child of `parent` or
    /// was already waited for. The child's edge is dropped once reaped.
    pub fn wait(&self, parent: &Pcb, pid: Pid) -> Result<i32, WaitError> {
        let relation = parent.child(pid).ok_or(WaitError::NotAChild(pid))?;
        if !relation.begin_wait() {
            return Err(WaitError::AlreadyWaited(pid));
        }
        let status = relation.await_exit(self.scheduler.as_ref());
        relation.acknowledge_reap();
        // A reaped child is no longer a child; a second wait sees NotAChild.
        parent.remove_child(pid);
        log::debug!("[PROCESS] pid {} reaped child {} ({})", parent.pid(), pid, status);
        Ok(status)
    }

    /// Terminate `pcb` with `status`. Runs at most once per process;
    /// returns when the process's state has been released.
    pub fn exit(&self, pcb: &Arc<Pcb>, status: i32) {
        if !pcb.record_exit(status) {
            return;
        }
        if self.config.announce_exits && !self.is_halted() {
            self.console
                .putbuf(format!("{}: exit({})\n", pcb.name(), status).as_bytes());
        }
        log::debug!("[PROCESS] pid {} exiting with {}", pcb.pid(), status);

        if let Some(mut executable) = pcb.take_executable() {
            self.fs.with_file(executable.as_mut(), |file| file.allow_write());
            self.fs.close(executable);
        }
        let files = pcb.fd_table().drain();
        for file in files {
            self.fs.close(file);
        }

        for child in pcb.take_children() {
            child.relation.await_exit(self.scheduler.as_ref());
            child.relation.release();
        }

        let relation = pcb.relation();
        relation.publish_exit(status);
        if !self.has_live_parent(pcb) {
            relation.release();
        }
        relation.await_reap_ack(self.scheduler.as_ref());

        self.processes.remove(pcb.pid());
        log::debug!("[PROCESS] pid {} released", pcb.pid());
    }

    /// The kernel counts as a live parent: it always reaps what it starts.
    fn has_live_parent(&self, pcb: &Pcb) -> bool {
        let parent = pcb.parent_pid();
        parent == Pid::KERNEL || self.processes.contains(parent)
    }

    /// Run the first user process and wait for it to exit.
    ///
    /// Returns its exit status, -1 if it could not be loaded.
    pub fn run_initial(self: &Arc<Self>, cmdline: &str) -> Result<i32, SpawnError> {
        let pcb = self.create_process(Pid::KERNEL, program_name(cmdline))?;
        let relation = pcb.relation().clone();
        self.start_process(&pcb, cmdline)?;
        drop(pcb);

        relation.begin_wait();
        let status = relation.await_exit(self.scheduler.as_ref());
        relation.acknowledge_reap();
        log::info!("[BOOT] initial process exited with {}", status);
        Ok(status)
    }
}
