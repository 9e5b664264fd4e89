//! System Call Interface
//!
//! The boundary where untrusted user processes request kernel services.
//!
//! # Security Model
//! - Whitelist approach: only the calls in [`numbers`] exist; anything else
//!   kills the caller
//! - The stack pointer, every argument slot, and every pointer argument
//!   are validated before use
//! - A bad address kills the calling process with status -1; it never
//!   becomes a kernel fault
//!
//! # Syscalls
//! | no. | call                         | result              |
//! |-----|------------------------------|---------------------|
//! | 0   | halt()                       | does not return     |
//! | 1   | exit(status)                 | does not return     |
//! | 2   | exec(cmdline)                | pid or -1           |
//! | 3   | wait(pid)                    | exit status or -1   |
//! | 4   | create(name, size)           | bool                |
//! | 5   | remove(name)                 | bool                |
//! | 6   | open(name)                   | fd or -1            |
//! | 7   | filesize(fd)                 | bytes or -1         |
//! | 8   | read(fd, buffer, size)       | bytes or -1         |
//! | 9   | write(fd, buffer, size)      | bytes or -1         |
//! | 10  | seek(fd, position)           | none                |
//! | 11  | tell(fd)                     | position or -1      |
//! | 12  | close(fd)                    | none                |

mod handler;
mod validate;

pub use handler::{dispatch, numbers, SyscallError};
pub use validate::{read_user_string, validate_arg, validate_buffer, validate_pointer, UserBuffer};
