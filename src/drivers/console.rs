//! Console driver
//!
//! Shared by every process: fd 1 writes here and fd 0 reads the keyboard
//! side of the same device.
//!
//! # Security Considerations
//! - The device sits behind a spinlock, so one `putbuf` call reaches the
//!   device as a contiguous run of bytes. Output of two processes can
//!   interleave between calls but never within one.
//! - The hardware itself (UART, VGA, keyboard controller) is supplied by
//!   the platform through [`ConsoleDevice`].

use alloc::boxed::Box;
use spin::Mutex;

/// Raw console hardware.
pub trait ConsoleDevice: Send {
    /// Transmit one byte.
    fn write_byte(&mut self, byte: u8);

    /// Next pending keyboard byte, or None when no input is available.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Console shared by all processes.
pub struct Console {
    device: Mutex<Box<dyn ConsoleDevice>>,
}

impl Console {
    pub fn new(device: Box<dyn ConsoleDevice>) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    /// Write a whole buffer without letting other writers in between.
    pub fn putbuf(&self, buf: &[u8]) {
        let mut device = self.device.lock();
        for &byte in buf {
            device.write_byte(byte);
        }
    }

    /// Read one keyboard byte.
    pub fn getc(&self) -> Option<u8> {
        self.device.lock().read_byte()
    }
}
