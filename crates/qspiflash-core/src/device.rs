//! PCIe device contract
//!
//! The flasher never owns the device. It borrows something that can move
//! bytes in and out of a BAR and answer a sysfs-style attribute lookup.

use alloc::string::String;

use crate::error::Result;

/// A PCIe function with a memory-mapped BAR
///
/// Implementations must fail (rather than return garbage) when a BAR access
/// does not complete. Accesses are never retried by callers.
pub trait PcieDevice {
    /// Read `buf.len()` bytes at byte `offset` within the BAR
    fn bar_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at byte `offset` within the BAR
    fn bar_write(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Look up a driver attribute such as `flash_type`
    ///
    /// `subdev` names the sub-device directory the attribute lives in; an
    /// empty string means the device directory itself. Returns `None` when
    /// the attribute is absent or unreadable.
    fn attribute(&self, _subdev: &str, _entry: &str) -> Option<String> {
        None
    }
}

impl<D: PcieDevice + ?Sized> PcieDevice for &mut D {
    fn bar_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).bar_read(offset, buf)
    }

    fn bar_write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).bar_write(offset, data)
    }

    fn attribute(&self, subdev: &str, entry: &str) -> Option<String> {
        (**self).attribute(subdev, entry)
    }
}

impl<D: PcieDevice + ?Sized> PcieDevice for alloc::boxed::Box<D> {
    fn bar_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).bar_read(offset, buf)
    }

    fn bar_write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).bar_write(offset, data)
    }

    fn attribute(&self, subdev: &str, entry: &str) -> Option<String> {
        (**self).attribute(subdev, entry)
    }
}
