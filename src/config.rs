//! Kernel configuration
//!
//! Tunables fixed at boot. ABI constants (the kernel/user boundary, the
//! syscall word size) live in `mm` and are not configurable.

/// Descriptors per process, including the two reserved console slots.
pub const DEFAULT_FD_CAPACITY: usize = 50;

/// Longest command line or file name accepted from user memory.
pub const DEFAULT_MAX_USER_STRING: usize = 4096;

/// Boot-time configuration for the user-program layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Capacity of each process's descriptor table. Must exceed 2.
    pub fd_capacity: usize,
    /// Longest string copied in from user memory, excluding the NUL.
    pub max_user_string: usize,
    /// Print `"<name>: exit(<status>)"` on the console when a process exits.
    pub announce_exits: bool,
}

impl KernelConfig {
    /// Clamp out-of-range values to something usable.
    pub fn sanitized(mut self) -> Self {
        if self.fd_capacity <= 2 {
            log::warn!(
                "[BOOT] fd_capacity {} leaves no usable slots, using {}",
                self.fd_capacity,
                DEFAULT_FD_CAPACITY
            );
            self.fd_capacity = DEFAULT_FD_CAPACITY;
        }
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            fd_capacity: DEFAULT_FD_CAPACITY,
            max_user_string: DEFAULT_MAX_USER_STRING,
            announce_exits: true,
        }
    }
}
