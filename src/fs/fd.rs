//! Per-process file descriptor table
//!
//! A fixed-capacity array of slots indexed by descriptor number.
//!
//! # Design
//! - Slots 0 and 1 are the keyboard and console; they are wired directly
//!   to the console driver and never hold a file
//! - New descriptors take the lowest free slot from `FIRST_FILE_FD` up, so
//!   closed descriptors are reused and a process that keeps opening and
//!   closing files never exhausts its table
//! - The table is owned by one process and only touched by that process's
//!   own thread; it is not inherited by children

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::error::{FdError, FdResult};
use super::OpenFile;

/// Keyboard input.
pub const STDIN_FILENO: i32 = 0;
/// Console output.
pub const STDOUT_FILENO: i32 = 1;
/// First descriptor handed out for files.
pub const FIRST_FILE_FD: i32 = 2;

/// A range-checked descriptor number.
///
/// This is a newtype to prevent indexing the table with an unchecked
/// integer straight from a user register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct Fd(i32);

impl Fd {
    /// Accept `raw` if `0 < raw < capacity`.
    #[inline]
    pub const fn new(raw: i32, capacity: usize) -> Option<Self> {
        if raw > 0 && (raw as usize) < capacity {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Descriptor table of one process.
pub struct FdTable {
    slots: Vec<Option<Box<dyn OpenFile>>>,
    open_count: usize,
}

impl FdTable {
    /// Create an empty table with `capacity` slots (reserved slots included).
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            open_count: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of files currently open.
    #[inline]
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn is_full(&self) -> bool {
        self.free_slot().is_none()
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(FIRST_FILE_FD as usize)
            .find(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
    }

    fn check(&self, raw: i32) -> FdResult<Fd> {
        Fd::new(raw, self.capacity()).ok_or(FdError::OutOfRange(raw))
    }

    /// Store an open file in the lowest free slot.
    ///
    /// When the table is full the file is handed back so the caller can
    /// close it under the filesystem lock.
    pub fn insert(&mut self, file: Box<dyn OpenFile>) -> Result<Fd, Box<dyn OpenFile>> {
        let Some(index) = self.free_slot() else {
            return Err(file);
        };
        self.slots[index] = Some(file);
        self.open_count += 1;
        Ok(Fd(index as i32))
    }

    /// Look up an open file.
    pub fn get_mut(&mut self, raw: i32) -> FdResult<&mut (dyn OpenFile + 'static)> {
        let fd = self.check(raw)?;
        match self.slots[fd.index()].as_mut() {
            Some(file) => Ok(file.as_mut()),
            None => Err(FdError::NotOpen(raw)),
        }
    }

    /// Take a file out of the table, freeing its slot.
    pub fn remove(&mut self, raw: i32) -> FdResult<Box<dyn OpenFile>> {
        let fd = self.check(raw)?;
        let file = self.slots[fd.index()].take().ok_or(FdError::NotOpen(raw))?;
        self.open_count -= 1;
        Ok(file)
    }

    /// Take every open file out of the table.
    pub fn drain(&mut self) -> Vec<Box<dyn OpenFile>> {
        self.open_count = 0;
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}
