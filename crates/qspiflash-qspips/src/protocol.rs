//! Flash command protocol
//!
//! Each operation is one or more bus transactions built from messages.
//! Command and address bytes always go out on one line to every chip;
//! data phases are striped across both chips in dual parallel mode.
//! Addresses are logical and are halved on the wire in dual mode.

use std::fmt;

use qspiflash_core::opcodes::{self, FlashVendor};
use qspiflash_core::{
    BusWidth, Clock, Deadline, Error, PcieDevice, Phase, Result, UpgradeProgress, WaitCondition,
};

use crate::controller::READY_POLL_INTERVAL;
use crate::flasher::QspiPsFlasher;
use crate::message::Message;
use crate::regs::Isr;

/// Dummy clocks between the address and data phases of fast reads
const READ_DUMMY_CYCLES: u32 = 8;

/// Identification read back with READ_ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashId {
    /// Raw response; in dual mode even bytes come from the lower chip
    pub bytes: [u8; opcodes::IDCODE_READ_BYTES],
    /// Recognized manufacturer, if any
    pub vendor: Option<FlashVendor>,
    /// JEDEC capacity code
    pub capacity: u8,
    /// Upper and lower chips disagree on some field (dual mode only)
    pub chips_mismatch: bool,
}

impl FlashId {
    /// JEDEC manufacturer byte
    pub fn manufacturer(&self) -> u8 {
        self.bytes[0]
    }
}

impl fmt::Display for FlashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor {
            Some(vendor) => write!(f, "{}", vendor.name())?,
            None => write!(f, "Unknown vendor 0x{:02X}", self.manufacturer())?,
        }
        write!(f, " (ID")?;
        for b in &self.bytes {
            write!(f, " {:02X}", b)?;
        }
        write!(f, ")")
    }
}

/// Build a command with a 4-byte big-endian wire address
pub fn address_command(cmd: u8, wire_addr: u32) -> [u8; 5] {
    let a = wire_addr.to_be_bytes();
    [cmd, a[0], a[1], a[2], a[3]]
}

/// Read opcode used when the caller passes none
///
/// Quad output read for every topology. The card's bus width attribute
/// does not change the opcode.
pub const DEFAULT_READ_CMD: u8 = opcodes::QOR;

/// Program opcode used when the caller passes none
pub const DEFAULT_WRITE_CMD: u8 = opcodes::QPP;

/// Lines used by the data phase of read opcode `cmd`
fn read_data_width(cmd: u8) -> BusWidth {
    match cmd {
        opcodes::QOR | opcodes::QOR_4B => BusWidth::X4,
        opcodes::DOR | opcodes::DOR_4B => BusWidth::X2,
        _ => BusWidth::X1,
    }
}

/// Lines used by the data phase of program opcode `cmd`
fn write_data_width(cmd: u8) -> BusWidth {
    match cmd {
        opcodes::QPP | opcodes::QPP_4B => BusWidth::X4,
        _ => BusWidth::X1,
    }
}

fn check_range(addr: u32, len: usize) -> Result<()> {
    let end = u64::from(addr) + len as u64;
    if end > u64::from(u32::MAX) + 1 {
        return Err(Error::InvalidArgument("range exceeds the 32-bit address space"));
    }
    Ok(())
}

impl<D: PcieDevice, C: Clock> QspiPsFlasher<D, C> {
    /// Poll the status register until the busy bit clears
    ///
    /// In dual mode the two chips' status bytes are ORed, so the flash is
    /// ready only when both chips are.
    pub fn is_flash_ready(&mut self) -> Result<()> {
        let deadline = Deadline::after(&self.ctrl.clock, self.config.ready_timeout);
        loop {
            let mut status = [0u8; opcodes::STATUS_READ_BYTES];
            self.ctrl.final_transfer(&mut [
                Message::tx(&[opcodes::RDSR]),
                Message::rx(&mut status).striped(),
            ])?;
            let sr = status[0] | status[1];
            if sr & opcodes::SR_WIP == 0 {
                return Ok(());
            }
            if deadline.expired(&self.ctrl.clock) {
                log::error!("Unable to get flash ready (SR=0x{:02X})", sr);
                return Err(Error::Timeout(WaitCondition::FlashReady));
            }
            self.ctrl.clock.sleep(READY_POLL_INTERVAL);
        }
    }

    /// Send WRITE ENABLE
    pub fn set_write_enable(&mut self) -> Result<()> {
        if self.ctrl.status()?.contains(Isr::TX_FULL) {
            log::error!("TX FIFO full during write enable");
            return Err(Error::TxFifoFull);
        }
        self.ctrl
            .final_transfer(&mut [Message::tx(&[opcodes::WREN])])?;
        log::log!(self.level(), "Set write enable");
        self.ctrl.wait_tx_empty()
    }

    /// Read and check the JEDEC identification
    ///
    /// A capacity byte of 0xFF means nothing answered. Disagreement between
    /// the two chips of a dual-parallel pair is reported but not fatal.
    pub fn get_flash_id(&mut self) -> Result<FlashId> {
        self.is_flash_ready()?;

        let mut bytes = [0u8; opcodes::IDCODE_READ_BYTES];
        self.ctrl.final_transfer(&mut [
            Message::tx(&[opcodes::RDID]),
            Message::rx(&mut bytes).striped(),
        ])?;

        let dual = self.topology().is_dual();
        let mut chips_mismatch = false;
        if dual {
            let fields = ["vendor id", "type", "capacity"];
            for (pair, field) in bytes.chunks_exact(2).zip(fields) {
                if pair[0] != pair[1] {
                    log::warn!(
                        "Upper and lower flash chips report a different {} (0x{:02X} vs 0x{:02X})",
                        field,
                        pair[0],
                        pair[1]
                    );
                    chips_mismatch = true;
                }
            }
        }

        let vendor = FlashVendor::from_jedec(bytes[0]);
        if vendor.is_none() {
            log::warn!("Unrecognized flash vendor 0x{:02X}", bytes[0]);
        }

        let capacity = if dual { bytes[4] } else { bytes[2] };
        if capacity == 0xFF {
            log::error!("Flash capacity reads 0xFF, no flash present");
            return Err(Error::FlashNotDetected);
        }

        for (i, b) in bytes.iter().enumerate() {
            log::info!("Idcode byte[{}]=0x{:02X}", i, b);
        }

        Ok(FlashId {
            bytes,
            vendor,
            capacity,
            chips_mismatch,
        })
    }

    /// Erase the sectors covering `byte_count` bytes from `addr`
    ///
    /// Two sectors past the covered range are erased as well. Returns the
    /// number of erase commands issued.
    pub fn erase_sector(
        &mut self,
        addr: u32,
        byte_count: u32,
        erase_cmd: u8,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<u32> {
        let sectors = byte_count / opcodes::SECTOR_SIZE + 2;
        self.erase_sectors(addr, sectors, erase_cmd, progress)?;
        log::log!(self.level(), "Erase flash done {} bytes", byte_count);
        Ok(sectors)
    }

    /// Issue `sectors` erase commands, one sector apart, from `addr`
    pub(crate) fn erase_sectors(
        &mut self,
        addr: u32,
        sectors: u32,
        erase_cmd: u8,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<()> {
        check_range(addr, sectors as usize * opcodes::SECTOR_SIZE as usize)?;

        progress.start(Phase::Erase, sectors as usize);
        for sector in 0..sectors {
            let sector_addr = addr + sector * opcodes::SECTOR_SIZE;
            self.is_flash_ready()?;
            self.set_write_enable()?;

            let cmd = address_command(erase_cmd, self.topology().wire_address(sector_addr));
            self.ctrl.final_transfer(&mut [Message::tx(&cmd)])?;
            log::trace!("Erased sector at 0x{:08X}", sector_addr);
            progress.advance(sector as usize + 1);
        }
        progress.finish(Phase::Erase);
        Ok(())
    }

    /// Erase the whole device
    pub fn erase_bulk(&mut self) -> Result<()> {
        self.is_flash_ready()?;
        self.set_write_enable()?;
        self.ctrl
            .final_transfer(&mut [Message::tx(&[opcodes::CE_C7])])?;
        self.is_flash_ready()
    }

    /// Read `len` bytes at logical `addr`
    ///
    /// `cmd` defaults to QUAD_READ. Fast read opcodes get eight dummy
    /// clocks before the data phase.
    pub fn read_flash(&mut self, addr: u32, len: usize, cmd: Option<u8>) -> Result<&[u8]> {
        self.read_into_buffer(addr, len, cmd)?;
        Ok(&self.read_buf[..len])
    }

    pub(crate) fn read_into_buffer(&mut self, addr: u32, len: usize, cmd: Option<u8>) -> Result<()> {
        if len > self.read_buf.len() {
            return Err(Error::InvalidArgument("read larger than the staging buffer"));
        }
        check_range(addr, len)?;
        self.read_buf.fill(0);
        self.is_flash_ready()?;

        let topology = self.topology();
        let cmd = cmd.unwrap_or(DEFAULT_READ_CMD);
        let header = address_command(cmd, topology.wire_address(addr));

        let mut msgs = Vec::with_capacity(3);
        msgs.push(Message::tx(&header));
        if opcodes::needs_dummy_cycles(cmd) {
            msgs.push(Message::dummy(READ_DUMMY_CYCLES));
        }
        msgs.push(
            Message::rx(&mut self.read_buf[..len])
                .with_bus_width(read_data_width(cmd))
                .striped(),
        );
        self.ctrl.final_transfer(&mut msgs)?;

        log::log!(self.level(), "Read flash done {} bytes", len);
        Ok(())
    }

    /// Program up to one page of `data` at logical `addr`
    ///
    /// `cmd` defaults to QUAD_WRITE.
    pub fn write_flash(&mut self, addr: u32, data: &[u8], cmd: Option<u8>) -> Result<()> {
        if data.len() > opcodes::PAGE_SIZE {
            return Err(Error::InvalidArgument("write larger than one page"));
        }
        self.write_buf.fill(0);
        self.write_buf[..data.len()].copy_from_slice(data);
        self.write_from_buffer(addr, data.len(), cmd)
    }

    pub(crate) fn write_from_buffer(&mut self, addr: u32, len: usize, cmd: Option<u8>) -> Result<()> {
        check_range(addr, len)?;
        self.is_flash_ready()?;
        self.set_write_enable()?;
        self.is_flash_ready()?;

        let topology = self.topology();
        let cmd = cmd.unwrap_or(DEFAULT_WRITE_CMD);
        let header = address_command(cmd, topology.wire_address(addr));

        self.ctrl.final_transfer(&mut [
            Message::tx(&header),
            Message::tx(&self.write_buf[..len])
                .with_bus_width(write_data_width(cmd))
                .striped(),
        ])?;

        log::log!(self.level(), "Write flash done {} bytes", len);
        Ok(())
    }

    /// Enter (`true`) or leave (`false`) 4-byte address mode
    pub fn enter_or_exit_four_bytes_mode(&mut self, enable: bool) -> Result<()> {
        let cmd = if enable { opcodes::EN4B } else { opcodes::EX4B };
        self.write_flash_reg(cmd, 0, 0)?;
        self.is_flash_ready()?;
        log::log!(self.level(), "Four bytes mode {}", if enable { "on" } else { "off" });
        Ok(())
    }

    /// Read `bytes` bytes of the register behind opcode `cmd`
    ///
    /// In dual mode even bytes come from the lower chip.
    pub fn read_flash_reg(&mut self, cmd: u8, bytes: usize) -> Result<&[u8]> {
        if bytes > self.read_buf.len() {
            return Err(Error::InvalidArgument("register read larger than the staging buffer"));
        }
        self.is_flash_ready()?;
        self.read_buf.fill(0);
        self.ctrl.final_transfer(&mut [
            Message::tx(&[cmd]),
            Message::rx(&mut self.read_buf[..bytes]).striped(),
        ])?;
        Ok(&self.read_buf[..bytes])
    }

    /// Write `bytes` (at most 2) bytes of `value`, big-endian, with opcode
    /// `cmd`
    pub fn write_flash_reg(&mut self, cmd: u8, value: u32, bytes: usize) -> Result<()> {
        let mut frame = [cmd, 0, 0];
        match bytes {
            0 => {}
            1 => frame[1] = value as u8,
            2 => {
                frame[1] = (value >> 8) as u8;
                frame[2] = value as u8;
            }
            _ => return Err(Error::InvalidArgument("register writes carry at most 2 bytes")),
        }

        self.set_write_enable()?;
        self.ctrl
            .final_transfer(&mut [Message::tx(&frame[..1 + bytes])])?;
        self.ctrl.wait_tx_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QspiPsConfig;
    use qspiflash_core::{ConnectMode, NoProgress, Topology};
    use qspiflash_dummy::{ChipConfig, DummyConfig, DummyController, ManualClock};

    fn flasher(
        dev: &mut DummyController,
    ) -> QspiPsFlasher<&mut DummyController, ManualClock> {
        let mut f = QspiPsFlasher::new(dev, ManualClock::new(), QspiPsConfig::default());
        f.bring_up().unwrap();
        f
    }

    #[test]
    fn test_address_command_is_big_endian() {
        assert_eq!(address_command(0xDC, 0x0123_4567), [0xDC, 0x01, 0x23, 0x45, 0x67]);
    }

    #[test]
    fn test_data_width_follows_opcode() {
        assert_eq!(read_data_width(DEFAULT_READ_CMD), BusWidth::X4);
        assert_eq!(read_data_width(opcodes::DOR), BusWidth::X2);
        assert_eq!(write_data_width(DEFAULT_WRITE_CMD), BusWidth::X4);
        assert_eq!(write_data_width(opcodes::PP), BusWidth::X1);
    }

    #[test]
    fn test_flash_id_dual() {
        let mut dev = DummyController::new(DummyConfig::default());
        let mut f = flasher(&mut dev);
        let id = f.get_flash_id().unwrap();
        assert_eq!(id.vendor, Some(FlashVendor::Micron));
        assert_eq!(id.capacity, 0x20);
        assert!(!id.chips_mismatch);
        assert_eq!(id.to_string(), "Micron (ID 20 20 BB BB 20 20)");
    }

    #[test]
    fn test_flash_id_mismatch_is_advisory() {
        let config = DummyConfig {
            upper: ChipConfig {
                jedec_id: [0xC2, 0x20, 0x1A],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let mut f = flasher(&mut dev);
        let id = f.get_flash_id().unwrap();
        assert!(id.chips_mismatch);
        assert_eq!(id.vendor, Some(FlashVendor::Micron));
        assert_eq!(id.capacity, 0x20);
    }

    #[test]
    fn test_flash_id_single_chip() {
        let config = DummyConfig {
            flash_type: Some("qspi_ps_x4_single".into()),
            lower: ChipConfig {
                jedec_id: [0xC2, 0x20, 0x1A],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let mut f = flasher(&mut dev);
        assert_eq!(f.topology().connect, ConnectMode::Single);
        let id = f.get_flash_id().unwrap();
        assert_eq!(id.vendor, Some(FlashVendor::Macronix));
        assert_eq!(id.capacity, 0x1A);
        assert!(!id.chips_mismatch);
    }

    #[test]
    fn test_flash_id_absent_capacity() {
        let config = DummyConfig {
            lower: ChipConfig {
                jedec_id: [0x20, 0xBB, 0xFF],
                ..Default::default()
            },
            upper: ChipConfig {
                jedec_id: [0x20, 0xBB, 0xFF],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let mut f = flasher(&mut dev);
        assert_eq!(f.get_flash_id(), Err(Error::FlashNotDetected));
    }

    #[test]
    fn test_busy_flash_times_out() {
        let mut dev = DummyController::new(DummyConfig::default());
        dev.set_stuck_busy(true);
        let mut f = flasher(&mut dev);
        assert_eq!(
            f.is_flash_ready(),
            Err(Error::Timeout(WaitCondition::FlashReady))
        );
    }

    #[test]
    fn test_erase_sector_addresses_and_count() {
        let mut dev = DummyController::new(DummyConfig::default());
        {
            let mut f = flasher(&mut dev);
            let n = f
                .erase_sector(0x20000, 0x10000, opcodes::BE_DC, &mut NoProgress)
                .unwrap();
            assert_eq!(n, 3);
        }
        let erases: Vec<u32> = dev
            .command_log()
            .iter()
            .filter(|c| c.opcode == opcodes::BE_DC)
            .map(|c| c.address.unwrap())
            .collect();
        // both chips see every command, addresses halved on the wire
        assert_eq!(
            erases,
            vec![0x10000, 0x10000, 0x18000, 0x18000, 0x20000, 0x20000]
        );
    }

    #[test]
    fn test_write_then_read_single_page() {
        let mut dev = DummyController::new(DummyConfig::default());
        let page: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
        let mut f = flasher(&mut dev);
        f.enter_or_exit_four_bytes_mode(true).unwrap();
        f.erase_sector(0, 0, opcodes::BE_DC, &mut NoProgress).unwrap();
        f.write_flash(0x100, &page, None).unwrap();
        assert_eq!(f.read_flash(0x100, page.len(), None).unwrap(), &page[..]);
        assert_eq!(f.read_flash(0x0, 4, None).unwrap(), &[0xFF; 4]);
    }

    #[test]
    fn test_write_rejects_more_than_a_page() {
        let mut dev = DummyController::new(DummyConfig::default());
        let mut f = flasher(&mut dev);
        let data = [0u8; 257];
        assert!(matches!(
            f.write_flash(0, &data, None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_flash_reg_limits_and_framing() {
        let mut dev = DummyController::new(DummyConfig::default());
        {
            let mut f = flasher(&mut dev);
            assert!(matches!(
                f.write_flash_reg(opcodes::WREAR, 0, 3),
                Err(Error::InvalidArgument(_))
            ));
            f.write_flash_reg(opcodes::WRSR, 0x1234, 2).unwrap();
        }
        let wrsr = dev
            .command_log()
            .iter()
            .find(|c| c.opcode == opcodes::WRSR)
            .cloned()
            .unwrap();
        assert_eq!(wrsr.payload, vec![0x12, 0x34]);
    }

    #[test]
    fn test_reads_start_from_a_clean_buffer() {
        let mut dev = DummyController::new(DummyConfig::default());
        let mut f = flasher(&mut dev);
        f.read_buf.fill(0xAA);
        f.read_flash_reg(opcodes::RDFSR, 2).unwrap();
        assert!(f.read_buf[2..].iter().all(|&b| b == 0));

        f.write_buf.fill(0xAA);
        f.write_flash(0, &[1, 2, 3], None).unwrap();
        assert_eq!(&f.write_buf[..3], &[1, 2, 3]);
        assert!(f.write_buf[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bulk_erase() {
        let mut dev = DummyController::new(DummyConfig::default());
        {
            let mut f = flasher(&mut dev);
            f.enter_or_exit_four_bytes_mode(true).unwrap();
            f.erase_sector(0, 0, opcodes::BE_DC, &mut NoProgress).unwrap();
            f.write_flash(0x40, &[0x5A; 64], None).unwrap();
            assert_eq!(f.read_flash(0x40, 4, None).unwrap(), &[0x5A; 4]);
            f.erase_bulk().unwrap();
        }
        let bulk = dev
            .command_log()
            .iter()
            .filter(|c| c.opcode == opcodes::CE_C7)
            .count();
        assert_eq!(bulk, 2);
        assert!(dev.logical_contents().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_x2_topology_uses_quad_defaults() {
        let config = DummyConfig {
            flash_type: Some("qspi_ps_x2".into()),
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        {
            let mut f = flasher(&mut dev);
            assert_eq!(f.topology().bus_width, BusWidth::X2);
            f.enter_or_exit_four_bytes_mode(true).unwrap();
            f.erase_sector(0, 0, opcodes::BE_DC, &mut NoProgress).unwrap();
            f.write_flash(0, &[0x11, 0x22, 0x33, 0x44], None).unwrap();
            assert_eq!(f.read_flash(0, 4, None).unwrap(), &[0x11, 0x22, 0x33, 0x44]);
        }
        let opcodes_seen: Vec<u8> = dev.command_log().iter().map(|c| c.opcode).collect();
        assert!(opcodes_seen.contains(&opcodes::QPP));
        assert!(opcodes_seen.contains(&opcodes::QOR));
        assert!(!opcodes_seen.contains(&opcodes::PP));
        assert!(!opcodes_seen.contains(&opcodes::DOR));
    }

    #[test]
    fn test_read_flash_reg_flag_status() {
        let mut dev = DummyController::new(DummyConfig::default());
        let mut f = flasher(&mut dev);
        assert_eq!(f.read_flash_reg(opcodes::RDFSR, 2).unwrap(), &[0x80, 0x80]);
    }

    #[test]
    fn test_single_topology_sends_logical_address() {
        let mut dev = DummyController::new(DummyConfig::default());
        {
            let topology = Topology {
                connect: ConnectMode::Single,
                ..Default::default()
            };
            let mut f = QspiPsFlasher::with_topology(
                &mut dev,
                ManualClock::new(),
                topology,
                QspiPsConfig::default(),
            );
            f.bring_up().unwrap();
            f.enter_or_exit_four_bytes_mode(true).unwrap();
            f.read_flash(0x1000, 16, None).unwrap();
        }
        let read = dev
            .command_log()
            .iter()
            .find(|c| c.opcode == opcodes::QOR)
            .cloned()
            .unwrap();
        assert_eq!(read.address, Some(0x1000));
        assert_eq!(read.chip, 0);
    }
}
