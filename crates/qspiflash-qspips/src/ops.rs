//! Standalone flash operations: read-out, range erase and diagnostics

use std::io::Write;

use qspiflash_core::opcodes::{self, PAGE_SIZE, SECTOR_SIZE};
use qspiflash_core::{Clock, Error, PcieDevice, Phase, Result, UpgradeProgress};

use crate::flasher::QspiPsFlasher;
use crate::protocol::FlashId;

/// Flash registers read by [`QspiPsFlasher::diagnose`]
///
/// Each register is read twice; in dual mode the first byte comes from
/// the lower chip and the second from the upper chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashDiagnostics {
    /// Identification
    pub id: FlashId,
    /// Status register
    pub status: [u8; 2],
    /// Flag status register
    pub flag_status: [u8; 2],
    /// Extended address register
    pub extended_address: [u8; 2],
}

impl<D: PcieDevice, C: Clock> QspiPsFlasher<D, C> {
    /// Run `body` with the controller up, the flash probed and 4-byte mode
    /// entered; 4-byte mode is left again even when `body` fails
    fn with_flash<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.bring_up()?;
        self.probe()?;
        self.enter_or_exit_four_bytes_mode(true)?;
        let result = body(self);
        let exit = self.enter_or_exit_four_bytes_mode(false);
        let value = result?;
        exit?;
        Ok(value)
    }

    fn read_reg_pair(&mut self, cmd: u8) -> Result<[u8; 2]> {
        let r = self.read_flash_reg(cmd, 2)?;
        Ok([r[0], r[1]])
    }

    /// Copy `len` bytes of flash starting at `offset` into `out`
    pub fn dump<W: Write>(
        &mut self,
        offset: u32,
        len: u32,
        out: &mut W,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<()> {
        if self.topology().is_dual() && offset % 2 != 0 {
            return Err(Error::InvalidArgument(
                "offset must be even in dual parallel mode",
            ));
        }
        if u64::from(offset) + u64::from(len) > u64::from(u32::MAX) + 1 {
            return Err(Error::InvalidArgument("range exceeds the 32-bit address space"));
        }

        self.with_flash(|f| {
            progress.start(Phase::Read, len as usize);
            let mut done = 0usize;
            while done < len as usize {
                let chunk = PAGE_SIZE.min(len as usize - done);
                let data = f.read_flash(offset + done as u32, chunk, None)?;
                out.write_all(data).map_err(|e| {
                    log::error!("Failed to write flash contents: {}", e);
                    Error::IoError
                })?;
                done += chunk;
                progress.advance(done);
            }
            progress.finish(Phase::Read);
            Ok(())
        })
    }

    /// Erase the sectors covering `len` bytes from sector-aligned `offset`
    ///
    /// Returns the number of sectors erased.
    pub fn erase_range(
        &mut self,
        offset: u32,
        len: u32,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<u32> {
        if offset % SECTOR_SIZE != 0 {
            return Err(Error::InvalidArgument("offset must be sector aligned"));
        }
        let sectors = len.div_ceil(SECTOR_SIZE);
        self.with_flash(|f| {
            f.erase_sectors(offset, sectors, opcodes::BE_DC, progress)?;
            f.is_flash_ready()?;
            Ok(sectors)
        })
    }

    /// Erase both chips completely with one bulk erase command
    pub fn erase_chip(&mut self, progress: &mut dyn UpgradeProgress) -> Result<()> {
        self.with_flash(|f| {
            progress.start(Phase::Erase, 1);
            f.erase_bulk()?;
            progress.advance(1);
            progress.finish(Phase::Erase);
            Ok(())
        })
    }

    /// Probe the flash and read its status, flag status and extended
    /// address registers
    pub fn diagnose(&mut self) -> Result<FlashDiagnostics> {
        self.bring_up()?;
        let id = self.probe()?;

        let status = self.read_reg_pair(opcodes::RDSR)?;
        let flag_status = self.read_reg_pair(opcodes::RDFSR)?;
        let extended_address = self.read_reg_pair(opcodes::RDEAR)?;

        log::info!(
            "SR={:02X?} FSR={:02X?} EAR={:02X?}",
            status,
            flag_status,
            extended_address
        );
        Ok(FlashDiagnostics {
            id,
            status,
            flag_status,
            extended_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QspiPsConfig;
    use qspiflash_core::NoProgress;
    use qspiflash_dummy::{DummyConfig, DummyController, ManualClock};

    fn flasher(dev: &mut DummyController) -> QspiPsFlasher<&mut DummyController, ManualClock> {
        QspiPsFlasher::new(dev, ManualClock::new(), QspiPsConfig::default())
    }

    #[test]
    fn test_dump_reads_logical_contents() {
        let mut dev = DummyController::new(DummyConfig::default());
        let pattern: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        dev.load_logical(0x200, &pattern);

        let mut out = Vec::new();
        flasher(&mut dev)
            .dump(0x200, 700, &mut out, &mut NoProgress)
            .unwrap();
        assert_eq!(out, &pattern[..700]);
        assert!(!dev.four_byte_mode(0));
    }

    #[test]
    fn test_dump_rejects_odd_offset_in_dual_mode() {
        let mut dev = DummyController::new(DummyConfig::default());
        let mut out = Vec::new();
        assert!(matches!(
            flasher(&mut dev).dump(1, 16, &mut out, &mut NoProgress),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_erase_range() {
        let mut dev = DummyController::new(DummyConfig::default());
        dev.load_logical(0, &[0u8; 0x100]);
        let n = flasher(&mut dev)
            .erase_range(0, 0x100, &mut NoProgress)
            .unwrap();
        assert_eq!(n, 1);
        assert!(dev.logical_contents()[..0x100].iter().all(|&b| b == 0xFF));

        let mut dev = DummyController::new(DummyConfig::default());
        assert!(matches!(
            flasher(&mut dev).erase_range(0x1000, 0x100, &mut NoProgress),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_erase_chip() {
        let mut dev = DummyController::new(DummyConfig::default());
        dev.load_logical(0x1000, &[0x3C; 0x200]);
        flasher(&mut dev).erase_chip(&mut NoProgress).unwrap();
        assert!(dev.logical_contents().iter().all(|&b| b == 0xFF));
        assert!(dev.command_log().iter().any(|c| c.opcode == opcodes::CE_C7));
        assert!(!dev.four_byte_mode(0));
    }

    #[test]
    fn test_diagnose() {
        let mut dev = DummyController::new(DummyConfig::default());
        let diag = flasher(&mut dev).diagnose().unwrap();
        assert_eq!(diag.status, [0, 0]);
        assert_eq!(diag.flag_status, [0x80, 0x80]);
        assert_eq!(diag.extended_address, [0, 0]);
        assert_eq!(diag.id.bytes[0], 0x20);
    }
}
