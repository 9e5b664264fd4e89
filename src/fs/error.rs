use core::fmt;

/// Descriptor table errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// Outside `0 < fd < capacity`, or one of the reserved console slots.
    OutOfRange(i32),
    /// In range but nothing is open there.
    NotOpen(i32),
    /// Every usable slot is taken.
    TableFull,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(fd) => write!(f, "fd {} out of range", fd),
            Self::NotOpen(fd) => write!(f, "fd {} is not open", fd),
            Self::TableFull => write!(f, "descriptor table full"),
        }
    }
}

pub type FdResult<T> = Result<T, FdError>;
