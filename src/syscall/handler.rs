//! System Call Handler
//!
//! Decodes the call number and arguments from the user stack, routes to
//! the handler, and writes the result back into the trap frame.
//!
//! # Security Considerations
//! - The stack pointer is fully validated before the call number is read
//! - Each argument slot is bounds-checked before it is read
//! - Pointer arguments are fully validated before they are dereferenced
//! - Unknown syscall numbers kill the caller

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::exception::{TrapDisposition, TrapFrame};
use crate::fs::{FdError, STDIN_FILENO, STDOUT_FILENO};
use crate::kernel::Kernel;
use crate::mm::{Access, Fault, UserAddr, UserMemory, WORD_SIZE};
use crate::process::{Pcb, Pid};

use super::validate::{self, read_user_string, validate_buffer};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
}

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Null, kernel, or unmapped address
    BadAddress(UserAddr),
    /// Invalid system call number
    UnknownCall(u32),
    /// String argument without a terminator within the configured limit
    StringTooLong,
    /// String argument that is not valid UTF-8
    InvalidString,
}

impl SyscallError {
    /// Fatal errors terminate the calling process with status -1.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::StringTooLong | Self::InvalidString)
    }
}

impl From<Fault> for SyscallError {
    fn from(fault: Fault) -> Self {
        Self::BadAddress(fault.addr)
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAddress(addr) => write!(f, "bad user address {}", addr),
            Self::UnknownCall(number) => write!(f, "unknown syscall {}", number),
            Self::StringTooLong => write!(f, "string argument too long"),
            Self::InvalidString => write!(f, "string argument is not UTF-8"),
        }
    }
}

/// What the dispatcher does once a handler returns.
enum Action {
    /// Store the value in the result register.
    Return(i32),
    /// Nothing to return.
    Resume,
    Exit(i32),
    Halt,
}

type HandlerResult = Result<Action, SyscallError>;

/// A size or offset as a syscall result. Values past `i32::MAX` are
/// clamped so they never read as the -1 error.
fn saturating_result<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}

/// Reads the call number and arguments off the user stack.
struct Args<'a> {
    mem: &'a dyn UserMemory,
    esp: UserAddr,
}

impl Args<'_> {
    fn number(&self) -> Result<u32, SyscallError> {
        validate::validate_pointer(self.mem, self.esp)?;
        Ok(self.mem.read_word(self.esp)?)
    }

    fn word(&self, index: usize) -> Result<u32, SyscallError> {
        let addr = self
            .esp
            .checked_add(WORD_SIZE * (index + 1))
            .ok_or(SyscallError::BadAddress(self.esp))?;
        validate::validate_arg(addr)?;
        Ok(self.mem.read_word(addr)?)
    }

    fn int(&self, index: usize) -> Result<i32, SyscallError> {
        self.word(index).map(|word| word as i32)
    }

    fn ptr(&self, index: usize) -> Result<UserAddr, SyscallError> {
        self.word(index).map(UserAddr::from)
    }
}

/// Dispatch a system call
///
/// # Arguments
/// * `kernel` - Kernel instance
/// * `current` - The calling process
/// * `mem` - The calling process's address space
/// * `frame` - Trap frame; `esp` locates the call, `eax` receives the result
///
/// # Security
/// - Any validation failure kills the caller without running the handler
/// - The result register is always written for calls that return a value
pub fn dispatch(
    kernel: &Arc<Kernel>,
    current: &Arc<Pcb>,
    mem: &dyn UserMemory,
    frame: &mut TrapFrame,
) -> TrapDisposition {
    let call = Syscall {
        kernel,
        current,
        mem,
    };

    match call.run(UserAddr::from(frame.esp)) {
        Ok(Action::Return(value)) => {
            frame.set_result(value);
            TrapDisposition::Resume
        }
        Ok(Action::Resume) => TrapDisposition::Resume,
        Ok(Action::Exit(status)) => {
            kernel.exit(current, status);
            TrapDisposition::Exited
        }
        Ok(Action::Halt) => {
            kernel.halt();
            kernel.exit(current, -1);
            TrapDisposition::Halted
        }
        Err(err) if !err.is_fatal() => {
            frame.set_result(-1);
            TrapDisposition::Resume
        }
        Err(err) => {
            log::warn!("[SYSCALL] killing pid {}: {}", current.pid(), err);
            frame.set_result(-1);
            kernel.exit(current, -1);
            TrapDisposition::Exited
        }
    }
}

/// One system call in flight.
struct Syscall<'a> {
    kernel: &'a Arc<Kernel>,
    current: &'a Arc<Pcb>,
    mem: &'a dyn UserMemory,
}

impl Syscall<'_> {
    fn run(&self, esp: UserAddr) -> HandlerResult {
        use numbers::*;

        let args = Args { mem: self.mem, esp };
        let number = args.number()?;
        log::trace!("[SYSCALL] pid {} call {}", self.current.pid(), number);

        match number {
            SYS_HALT => Ok(Action::Halt),
            SYS_EXIT => Ok(Action::Exit(args.int(0)?)),
            SYS_EXEC => self.sys_exec(args.ptr(0)?),
            SYS_WAIT => self.sys_wait(args.int(0)?),
            SYS_CREATE => self.sys_create(args.ptr(0)?, args.word(1)?),
            SYS_REMOVE => self.sys_remove(args.ptr(0)?),
            SYS_OPEN => self.sys_open(args.ptr(0)?),
            SYS_FILESIZE => self.sys_filesize(args.int(0)?),
            SYS_READ => self.sys_read(args.int(0)?, args.ptr(1)?, args.word(2)?),
            SYS_WRITE => self.sys_write(args.int(0)?, args.ptr(1)?, args.word(2)?),
            SYS_SEEK => self.sys_seek(args.int(0)?, args.word(1)?),
            SYS_TELL => self.sys_tell(args.int(0)?),
            SYS_CLOSE => self.sys_close(args.int(0)?),
            _ => Err(SyscallError::UnknownCall(number)),
        }
    }

    /// Copy in a string argument; None if it exceeds the configured limit
    /// or is not valid UTF-8.
    fn string_arg(&self, addr: UserAddr) -> Result<Option<String>, SyscallError> {
        match read_user_string(self.mem, addr, self.kernel.config().max_user_string) {
            Ok(s) => Ok(Some(s)),
            Err(err) if !err.is_fatal() => Ok(None),
            Err(err) => Err(err),
        }
    }

    // ── processes ──

    fn sys_exec(&self, cmdline: UserAddr) -> HandlerResult {
        if cmdline.is_null() {
            return Ok(Action::Return(-1));
        }
        let Some(cmdline) = self.string_arg(cmdline)? else {
            return Ok(Action::Return(-1));
        };

        match self.kernel.exec(self.current, &cmdline) {
            Ok(pid) => Ok(Action::Return(pid.as_i32())),
            Err(err) => {
                log::debug!("[SYSCALL] exec '{}': {}", cmdline, err);
                Ok(Action::Return(-1))
            }
        }
    }

    fn sys_wait(&self, pid: i32) -> HandlerResult {
        let Some(pid) = Pid::from_raw(pid) else {
            return Ok(Action::Return(-1));
        };
        match self.kernel.wait(self.current, pid) {
            Ok(status) => Ok(Action::Return(status)),
            Err(err) => {
                log::debug!("[SYSCALL] wait: {}", err);
                Ok(Action::Return(-1))
            }
        }
    }

    // ── files ──

    fn sys_create(&self, name: UserAddr, size: u32) -> HandlerResult {
        let Some(name) = self.string_arg(name)? else {
            return Ok(Action::Return(0));
        };
        let created = self.kernel.filesystem().with_fs(|fs| fs.create(&name, size));
        Ok(Action::Return(i32::from(created)))
    }

    fn sys_remove(&self, name: UserAddr) -> HandlerResult {
        let Some(name) = self.string_arg(name)? else {
            return Ok(Action::Return(0));
        };
        let removed = self.kernel.filesystem().with_fs(|fs| fs.remove(&name));
        Ok(Action::Return(i32::from(removed)))
    }

    fn sys_open(&self, name: UserAddr) -> HandlerResult {
        let Some(name) = self.string_arg(name)? else {
            return Ok(Action::Return(-1));
        };
        let fs = self.kernel.filesystem();

        let mut table = self.current.fd_table();
        if table.is_full() {
            log::debug!("[FS] pid {}: {}", self.current.pid(), FdError::TableFull);
            return Ok(Action::Return(-1));
        }
        let Some(file) = fs.with_fs(|fs| fs.open(&name)) else {
            return Ok(Action::Return(-1));
        };
        match table.insert(file) {
            Ok(fd) => Ok(Action::Return(fd.raw())),
            Err(file) => {
                fs.close(file);
                Ok(Action::Return(-1))
            }
        }
    }

    fn sys_filesize(&self, fd: i32) -> HandlerResult {
        let mut table = self.current.fd_table();
        let Ok(file) = table.get_mut(fd) else {
            return Ok(Action::Return(-1));
        };
        let length = self.kernel.filesystem().with_file(file, |f| f.length());
        Ok(Action::Return(saturating_result(length)))
    }

    fn sys_read(&self, fd: i32, buffer: UserAddr, size: u32) -> HandlerResult {
        let buffer = validate_buffer(self.mem, buffer, size as usize, Access::WRITE)?;

        if fd == STDIN_FILENO {
            let mut data = Vec::with_capacity(buffer.len());
            while data.len() < buffer.len() {
                match self.kernel.console().getc() {
                    Some(byte) => data.push(byte),
                    None => break,
                }
            }
            buffer.copy_out(self.mem, &data)?;
            return Ok(Action::Return(saturating_result(data.len())));
        }

        let mut table = self.current.fd_table();
        let Ok(file) = table.get_mut(fd) else {
            return Ok(Action::Return(-1));
        };
        let mut data = vec![0u8; buffer.len()];
        let count = self.kernel.filesystem().with_file(file, |f| f.read(&mut data));
        drop(table);

        buffer.copy_out(self.mem, &data[..count])?;
        Ok(Action::Return(saturating_result(count)))
    }

    fn sys_write(&self, fd: i32, buffer: UserAddr, size: u32) -> HandlerResult {
        let buffer = validate_buffer(self.mem, buffer, size as usize, Access::READ)?;
        let data = buffer.copy_in(self.mem)?;

        if fd == STDOUT_FILENO {
            self.kernel.console().putbuf(&data);
            return Ok(Action::Return(saturating_result(data.len())));
        }

        let mut table = self.current.fd_table();
        let Ok(file) = table.get_mut(fd) else {
            return Ok(Action::Return(-1));
        };
        let count = self.kernel.filesystem().with_file(file, |f| f.write(&data));
        Ok(Action::Return(saturating_result(count)))
    }

    fn sys_seek(&self, fd: i32, position: u32) -> HandlerResult {
        let mut table = self.current.fd_table();
        if let Ok(file) = table.get_mut(fd) {
            self.kernel.filesystem().with_file(file, |f| f.seek(position));
        }
        Ok(Action::Resume)
    }

    fn sys_tell(&self, fd: i32) -> HandlerResult {
        let mut table = self.current.fd_table();
        let Ok(file) = table.get_mut(fd) else {
            return Ok(Action::Return(-1));
        };
        let position = self.kernel.filesystem().with_file(file, |f| f.tell());
        Ok(Action::Return(saturating_result(position)))
    }

    fn sys_close(&self, fd: i32) -> HandlerResult {
        let removed = self.current.fd_table().remove(fd);
        if let Ok(file) = removed {
            self.kernel.filesystem().close(file);
        }
        Ok(Action::Resume)
    }
}
