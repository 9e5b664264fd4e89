//! Device drivers for PantherOS
//!
//! All drivers follow these security principles:
//! - Device access is serialized by a spinlock owned by the driver
//! - Input validation on all public interfaces
//! - No panics on invalid input (return errors)

pub mod console;

pub use console::{Console, ConsoleDevice};
