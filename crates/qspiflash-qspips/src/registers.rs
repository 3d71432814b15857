//! Register access layer
//!
//! Every controller register is 32 bits wide, little-endian, and lives at
//! `flash_base + offset` inside the BAR. A failed BAR access is logged and
//! reported with the offending offset; nothing is retried.

use qspiflash_core::{Error, PcieDevice, Result};

/// 32-bit register window onto the GQSPI controller
pub struct Registers<D> {
    dev: D,
    base: u64,
}

impl<D: PcieDevice> Registers<D> {
    /// Wrap `dev` with the controller window starting at `base`
    pub fn new(dev: D, base: u64) -> Self {
        Self { dev, base }
    }

    /// Read the register at `offset`
    pub fn read(&mut self, offset: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        if let Err(e) = self.dev.bar_read(self.base + u64::from(offset), &mut buf) {
            log::error!("Failed to read register 0x{:03X}: {}", offset, e);
            return Err(Error::RegisterRead { offset });
        }
        let value = u32::from_le_bytes(buf);
        log::trace!("rd 0x{:03X} -> 0x{:08X}", offset, value);
        Ok(value)
    }

    /// Write `value` to the register at `offset`
    pub fn write(&mut self, offset: u32, value: u32) -> Result<()> {
        log::trace!("wr 0x{:03X} <- 0x{:08X}", offset, value);
        if let Err(e) = self
            .dev
            .bar_write(self.base + u64::from(offset), &value.to_le_bytes())
        {
            log::error!("Failed to write register 0x{:03X}: {}", offset, e);
            return Err(Error::RegisterWrite { offset });
        }
        Ok(())
    }
}
