pub mod console;

pub use console::{Capture, ConsoleIn, ConsoleOut};

/// A memory-mapped device. The bus calls it inline with the instruction that
/// touched its address; `addr` is the absolute address that was accessed.
pub trait IoDevice {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
}

impl core::fmt::Debug for dyn IoDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "IoDevice")
    }
}

/// Adapts a pair of closures into a device.
pub struct Handler<R, W> {
    on_read: R,
    on_write: W,
}

impl<R, W> Handler<R, W>
where
    R: FnMut(u16) -> u8,
    W: FnMut(u16, u8),
{
    pub fn new(on_read: R, on_write: W) -> Self {
        Handler { on_read, on_write }
    }
}

impl<R, W> IoDevice for Handler<R, W>
where
    R: FnMut(u16) -> u8,
    W: FnMut(u16, u8),
{
    fn read(&mut self, addr: u16) -> u8 {
        (self.on_read)(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        (self.on_write)(addr, value)
    }
}
