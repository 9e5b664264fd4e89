//! System Call Input Validation
//!
//! Every user-supplied address passes through here before the kernel
//! touches the memory behind it.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: any failure kills the calling process
//! - Prevent common vulnerabilities:
//!   - Kernel memory disclosure (boundary check against `PHYS_BASE`)
//!   - Kernel page faults (fault-tolerant probe of unmapped pages)
//!   - Length overflow (checked arithmetic on untrusted sizes)
//!   - TOCTOU races (data is copied into kernel buffers before use)

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::mm::{Access, UserAddr, UserMemory, PAGE_SIZE};

use super::handler::SyscallError;

/// Validate a pointer the kernel is about to dereference.
///
/// Fails if the address is null, at or above `PHYS_BASE`, or if a
/// single-byte probe of it faults.
pub fn validate_pointer(mem: &dyn UserMemory, addr: UserAddr) -> Result<UserAddr, SyscallError> {
    probe(mem, addr, Access::READ).map(|_| addr)
}

/// Validate the address of an argument slot on the user stack.
///
/// Only the boundary is checked: when the stack pointer itself was valid,
/// the slots above it can only go wrong by spilling past the top of user
/// space.
pub fn validate_arg(addr: UserAddr) -> Result<UserAddr, SyscallError> {
    if !addr.is_user() {
        return Err(SyscallError::BadAddress(addr));
    }
    Ok(addr)
}

fn probe(mem: &dyn UserMemory, addr: UserAddr, access: Access) -> Result<u8, SyscallError> {
    if addr.is_null() || !addr.is_user() {
        return Err(SyscallError::BadAddress(addr));
    }
    mem.probe(addr, access)
        .map_err(|fault| SyscallError::BadAddress(fault.addr))
}

/// A validated user-space buffer
///
/// Only constructed after every page the buffer touches has been probed
/// with the access the kernel intends to perform.
#[derive(Debug, Clone, Copy)]
pub struct UserBuffer {
    addr: UserAddr,
    len: usize,
}

impl UserBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the buffer contents into kernel memory.
    ///
    /// The copy is what the kernel works on, so a process rewriting its
    /// buffer mid-call cannot change what was checked.
    pub fn copy_in(&self, mem: &dyn UserMemory) -> Result<Vec<u8>, SyscallError> {
        let mut data = vec![0u8; self.len];
        mem.read_bytes(self.addr, &mut data)?;
        Ok(data)
    }

    /// Store `data` at the start of the buffer.
    ///
    /// `data` must not be longer than the validated length.
    pub fn copy_out(&self, mem: &dyn UserMemory, data: &[u8]) -> Result<(), SyscallError> {
        if data.len() > self.len {
            return Err(SyscallError::BadAddress(self.addr));
        }
        mem.write_bytes(self.addr, data)?;
        Ok(())
    }
}

/// Validate a user-space buffer
///
/// # Security Checks
/// 1. The start pointer passes full validation (even for zero length)
/// 2. `addr + len` doesn't overflow
/// 3. Every page the buffer crosses, and its last byte, probe successfully
///    with `access`
pub fn validate_buffer(
    mem: &dyn UserMemory,
    addr: UserAddr,
    len: usize,
    access: Access,
) -> Result<UserBuffer, SyscallError> {
    probe(mem, addr, access)?;
    if len == 0 {
        return Ok(UserBuffer { addr, len });
    }

    let last = addr
        .checked_add(len - 1)
        .ok_or(SyscallError::BadAddress(addr))?;

    let mut page = addr.align_down();
    while page < last.align_down() {
        page = page
            .checked_add(PAGE_SIZE)
            .ok_or(SyscallError::BadAddress(page))?;
        probe(mem, page, access)?;
    }
    probe(mem, last, access)?;

    Ok(UserBuffer { addr, len })
}

/// Copy a NUL-terminated string out of user memory.
///
/// Each byte is probed before it is read, so a string running into an
/// unmapped page kills the caller instead of the kernel. Strings without a
/// terminator within `max_len` bytes are rejected with `StringTooLong`,
/// and strings that are not valid UTF-8 with `InvalidString`; nothing is
/// rewritten, so distinct user byte strings stay distinct names.
pub fn read_user_string(
    mem: &dyn UserMemory,
    addr: UserAddr,
    max_len: usize,
) -> Result<String, SyscallError> {
    validate_pointer(mem, addr)?;

    let mut bytes = Vec::new();
    let mut cursor = addr;
    loop {
        let byte = probe(mem, cursor, Access::READ)?;
        if byte == 0 {
            break;
        }
        if bytes.len() == max_len {
            return Err(SyscallError::StringTooLong);
        }
        bytes.push(byte);
        cursor = cursor
            .checked_add(1)
            .ok_or(SyscallError::BadAddress(cursor))?;
    }

    String::from_utf8(bytes).map_err(|_| SyscallError::InvalidString)
}
