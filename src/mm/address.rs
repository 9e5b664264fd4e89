//! User Virtual Address Type
//!
//! Type-safe wrapper for addresses handed to the kernel by user code.
//! A `UserAddr` is only a number: it can be compared against the
//! kernel/user boundary and stepped page by page, but it can never be
//! dereferenced directly. All access goes through [`super::UserMemory`].
//!
//! # Address Space Layout
//! ```text
//! 0x0000_0000 ┌──────────────────────┐
//!             │  user code / data    │
//!             │  ...                 │
//!             │  user stack (grows ↓)│
//! PHYS_BASE   ├──────────────────────┤ 0xC000_0000
//!             │  kernel              │
//! 0xFFFF_FFFF └──────────────────────┘
//! ```

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// First kernel address. Everything below belongs to the user process.
pub const PHYS_BASE: usize = 0xC000_0000;

/// Size of one syscall ABI word (call number or argument slot).
pub const WORD_SIZE: usize = 4;

/// An address in the calling process's user address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UserAddr(usize);

impl UserAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Wrap a raw address taken from user registers or user memory.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check whether the address lies below the kernel/user boundary.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < PHYS_BASE
    }

    /// Offset within the page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Add an offset, returning None on overflow.
    ///
    /// User-supplied lengths are untrusted, so there is no wrapping variant.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl From<u32> for UserAddr {
    fn from(word: u32) -> Self {
        Self(word as usize)
    }
}

impl fmt::Debug for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserAddr({:#010x})", self.0)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
