//! Emulated GQSPI controller
//!
//! Models the register file, the three FIFOs and the generic FIFO engine
//! closely enough to run the real driver against it. Entries execute as
//! soon as they are queued while the controller is enabled; a TX entry
//! that runs out of data waits for the host to push more.

use std::collections::VecDeque;

use qspiflash_core::{Error, PcieDevice, Result};

use crate::chip::{CommandRecord, FlashChip};
use crate::DummyConfig;

/// Register offsets understood by the emulator
mod reg {
    pub const CFG: u32 = 0x100;
    pub const ISR: u32 = 0x104;
    pub const IER: u32 = 0x108;
    pub const IDR: u32 = 0x10C;
    pub const IMR: u32 = 0x110;
    pub const EN: u32 = 0x114;
    pub const TXD: u32 = 0x11C;
    pub const RXD: u32 = 0x120;
    pub const TX_THRESH: u32 = 0x128;
    pub const RX_THRESH: u32 = 0x12C;
    pub const GEN_FIFO: u32 = 0x140;
    pub const SEL: u32 = 0x144;
    pub const FIFO_CTRL: u32 = 0x14C;
    pub const GF_THRESH: u32 = 0x150;
    pub const MOD_ID: u32 = 0x1FC;
    /// Size of the register window
    pub const WINDOW: u32 = 0x200;
}

mod isr {
    pub const TX_NOT_FULL: u32 = 0x004;
    pub const TX_FULL: u32 = 0x008;
    pub const RX_NOT_EMPTY: u32 = 0x010;
    pub const GEN_FIFO_EMPTY: u32 = 0x080;
    pub const TX_EMPTY: u32 = 0x100;
    pub const GEN_FIFO_NOT_FULL: u32 = 0x200;
    pub const RX_EMPTY: u32 = 0x800;
}

mod entry {
    pub const IMM: u32 = 0x0000_00FF;
    pub const DATA_XFER: u32 = 0x0000_0100;
    pub const EXP: u32 = 0x0000_0200;
    pub const CS_LOWER: u32 = 0x0000_1000;
    pub const CS_UPPER: u32 = 0x0000_2000;
    pub const BUS_LOWER: u32 = 0x0000_4000;
    pub const BUS_UPPER: u32 = 0x0000_8000;
    pub const TX: u32 = 0x0001_0000;
    pub const RX: u32 = 0x0002_0000;
    pub const STRIPE: u32 = 0x0004_0000;
}

/// TX FIFO capacity in words
const TX_FIFO_WORDS: usize = 32;

/// Module ID reported by MOD_ID
const MODULE_ID: u32 = 0x010A_0000;

/// TX data entry waiting for bytes
#[derive(Debug, Clone, Copy)]
struct ActiveTx {
    remaining: u64,
    lower: bool,
    upper: bool,
    stripe: bool,
    index: u64,
}

/// GQSPI controller with two flash chips behind it
pub struct DummyController {
    config: DummyConfig,
    chips: [FlashChip; 2],
    cfg: u32,
    en: u32,
    sel: u32,
    imr: u32,
    tx_thresh: u32,
    rx_thresh: u32,
    gf_thresh: u32,
    gen_fifo: VecDeque<u32>,
    tx_fifo: VecDeque<u32>,
    rx_fifo: VecDeque<u32>,
    tx_word: Option<([u8; 4], usize)>,
    active: Option<ActiveTx>,
    gen_fifo_log: Vec<u32>,
    commands: Vec<CommandRecord>,
    stalled: bool,
    unplugged: bool,
}

impl DummyController {
    /// Create a controller in its power-on state with erased chips
    pub fn new(config: DummyConfig) -> Self {
        let chips = [
            FlashChip::new(0, config.lower.clone()),
            FlashChip::new(1, config.upper.clone()),
        ];
        Self {
            config,
            chips,
            cfg: 0xA008_0010,
            en: 0,
            sel: 0,
            imr: 0xFBE,
            tx_thresh: 1,
            rx_thresh: 1,
            gf_thresh: 0x10,
            gen_fifo: VecDeque::new(),
            tx_fifo: VecDeque::new(),
            rx_fifo: VecDeque::new(),
            tx_word: None,
            active: None,
            gen_fifo_log: Vec::new(),
            commands: Vec::new(),
            stalled: false,
            unplugged: false,
        }
    }

    /// Whether the configured `flash_type` wires two chips in parallel
    pub fn is_dual(&self) -> bool {
        !self
            .config
            .flash_type
            .as_deref()
            .is_some_and(|t| t.contains("single"))
    }

    /// Every word written to the generic FIFO, in order
    pub fn gen_fifo_log(&self) -> &[u32] {
        &self.gen_fifo_log
    }

    /// Commands decoded by the chips, in order of chip select release
    pub fn command_log(&self) -> &[CommandRecord] {
        &self.commands
    }

    /// Contents of chip `index`
    pub fn chip_contents(&self, index: usize) -> &[u8] {
        self.chips[index].data()
    }

    /// Whether chip `index` is in 4-byte address mode
    pub fn four_byte_mode(&self, index: usize) -> bool {
        self.chips[index].four_byte_mode()
    }

    /// The flash contents as the host sees them
    ///
    /// In dual parallel mode even bytes live in the lower chip and odd
    /// bytes in the upper chip.
    pub fn logical_contents(&self) -> Vec<u8> {
        if !self.is_dual() {
            return self.chips[0].data().to_vec();
        }
        let (lower, upper) = (self.chips[0].data(), self.chips[1].data());
        lower
            .iter()
            .zip(upper)
            .flat_map(|(&l, &u)| [l, u])
            .collect()
    }

    /// Preload `data` at logical `offset`, bypassing the command interface
    pub fn load_logical(&mut self, offset: usize, data: &[u8]) {
        if !self.is_dual() {
            self.chips[0].data_mut()[offset..offset + data.len()].copy_from_slice(data);
            return;
        }
        for (i, &b) in data.iter().enumerate() {
            let addr = offset + i;
            self.chips[addr % 2].data_mut()[addr / 2] = b;
        }
    }

    /// Stop executing generic FIFO entries
    pub fn stall_gen_fifo(&mut self, stall: bool) {
        self.stalled = stall;
        self.pump();
    }

    /// Keep both chips busy forever
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        for chip in &mut self.chips {
            chip.set_stuck_busy(stuck);
        }
    }

    /// Force bits in `mask` to read as zero at `addr` of chip `index`
    pub fn stick_bits_low(&mut self, index: usize, addr: usize, mask: u8) {
        self.chips[index].stick_bits_low(addr, mask);
    }

    /// Make every BAR read return all ones, as a surprise-removed device
    pub fn unplug(&mut self) {
        self.unplugged = true;
    }

    fn isr(&self) -> u32 {
        let mut v = isr::GEN_FIFO_NOT_FULL;
        if self.gen_fifo.is_empty() {
            v |= isr::GEN_FIFO_EMPTY;
        }
        if self.tx_fifo.is_empty() {
            v |= isr::TX_EMPTY;
        }
        if self.tx_fifo.len() < TX_FIFO_WORDS {
            v |= isr::TX_NOT_FULL;
        } else {
            v |= isr::TX_FULL;
        }
        if self.rx_fifo.is_empty() {
            v |= isr::RX_EMPTY;
        } else if self.rx_fifo.len() >= self.rx_thresh.max(1) as usize {
            v |= isr::RX_NOT_EMPTY;
        }
        v
    }

    fn read_reg(&mut self, offset: u32) -> u32 {
        match offset {
            reg::CFG => self.cfg,
            reg::ISR => self.isr(),
            reg::IMR => self.imr,
            reg::EN => self.en,
            reg::SEL => self.sel,
            reg::TX_THRESH => self.tx_thresh,
            reg::RX_THRESH => self.rx_thresh,
            reg::GF_THRESH => self.gf_thresh,
            reg::MOD_ID => MODULE_ID,
            reg::RXD => self.rx_fifo.pop_front().unwrap_or(0),
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u32, value: u32) {
        match offset {
            reg::CFG => self.cfg = value,
            reg::IER => self.imr &= !value,
            reg::IDR => self.imr |= value,
            reg::EN => {
                self.en = value & 1;
                self.pump();
            }
            reg::SEL => self.sel = value & 1,
            reg::TX_THRESH => self.tx_thresh = value,
            reg::RX_THRESH => self.rx_thresh = value,
            reg::GF_THRESH => self.gf_thresh = value,
            reg::FIFO_CTRL => {
                if value & 0x1 != 0 {
                    self.gen_fifo.clear();
                    self.active = None;
                }
                if value & 0x2 != 0 {
                    self.tx_fifo.clear();
                    self.tx_word = None;
                }
                if value & 0x4 != 0 {
                    self.rx_fifo.clear();
                }
            }
            reg::TXD => {
                if self.tx_fifo.len() >= TX_FIFO_WORDS {
                    log::warn!("TX FIFO overflow, dropping 0x{:08X}", value);
                } else {
                    self.tx_fifo.push_back(value);
                }
                self.pump();
            }
            reg::GEN_FIFO => {
                self.gen_fifo_log.push(value);
                self.gen_fifo.push_back(value);
                self.pump();
            }
            // ISR is write-one-to-clear; nothing latches in the model
            _ => {}
        }
    }

    /// Execute queued entries until the queue empties or TX data runs out
    fn pump(&mut self) {
        if self.en == 0 || self.stalled {
            return;
        }
        loop {
            if self.active.is_some() {
                if !self.run_tx() {
                    return;
                }
                continue;
            }
            match self.gen_fifo.pop_front() {
                Some(word) => self.start_entry(word),
                None => return,
            }
        }
    }

    fn start_entry(&mut self, word: u32) {
        let lower = word & entry::BUS_LOWER != 0;
        let upper = word & entry::BUS_UPPER != 0;

        if word & entry::DATA_XFER == 0 {
            let cs_lower = word & entry::CS_LOWER != 0;
            let cs_upper = word & entry::CS_UPPER != 0;
            if cs_lower || cs_upper {
                if cs_lower {
                    self.chips[0].select();
                }
                if cs_upper {
                    self.chips[1].select();
                }
            } else {
                for chip in &mut self.chips {
                    if let Some(record) = chip.deselect() {
                        self.commands.push(record);
                    }
                }
            }
            return;
        }

        let imm = u64::from(word & entry::IMM);
        let len = if word & entry::EXP != 0 { 1u64 << imm } else { imm };
        let stripe = word & entry::STRIPE != 0 && lower && upper;

        if word & entry::TX != 0 {
            self.active = Some(ActiveTx {
                remaining: len,
                lower,
                upper,
                stripe,
                index: 0,
            });
        } else if word & entry::RX != 0 {
            let bytes: Vec<u8> = (0..len)
                .map(|i| {
                    let chip = if stripe {
                        (i % 2) as usize
                    } else if lower {
                        0
                    } else {
                        1
                    };
                    self.chips[chip].clock_out()
                })
                .collect();
            for chunk in bytes.chunks(4) {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                self.rx_fifo.push_back(u32::from_le_bytes(word));
            }
        }
        // neither TX nor RX: dummy clocks, nothing observable
    }

    /// Feed TX bytes into the chips; false when the FIFO ran dry
    fn run_tx(&mut self) -> bool {
        let Some(mut tx) = self.active else {
            return true;
        };
        while tx.remaining > 0 {
            let Some(byte) = self.next_tx_byte() else {
                self.active = Some(tx);
                return false;
            };
            if tx.stripe {
                self.chips[(tx.index % 2) as usize].clock_in(byte);
            } else {
                if tx.lower {
                    self.chips[0].clock_in(byte);
                }
                if tx.upper {
                    self.chips[1].clock_in(byte);
                }
            }
            tx.index += 1;
            tx.remaining -= 1;
        }
        // the rest of a partially used word belongs to no one
        self.tx_word = None;
        self.active = None;
        true
    }

    fn next_tx_byte(&mut self) -> Option<u8> {
        if self.tx_word.is_none() {
            let word = self.tx_fifo.pop_front()?;
            self.tx_word = Some((word.to_le_bytes(), 0));
        }
        let (bytes, pos) = self.tx_word.as_mut()?;
        let byte = bytes[*pos];
        *pos += 1;
        if *pos == 4 {
            self.tx_word = None;
        }
        Some(byte)
    }

    fn register_offset(&self, offset: u64, len: usize) -> Result<u32> {
        let base = self.config.flash_base;
        if len != 4 || offset < base || offset - base >= u64::from(reg::WINDOW) || offset % 4 != 0 {
            log::error!("Unsupported BAR access at 0x{:X} ({} bytes)", offset, len);
            return Err(Error::IoError);
        }
        Ok((offset - base) as u32)
    }
}

impl PcieDevice for DummyController {
    fn bar_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let reg = self.register_offset(offset, buf.len())?;
        let value = if self.unplugged {
            u32::MAX
        } else {
            self.read_reg(reg)
        };
        buf.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn bar_write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let reg = self.register_offset(offset, data.len())?;
        if self.unplugged {
            return Ok(());
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(data);
        self.write_reg(reg, u32::from_le_bytes(word));
        Ok(())
    }

    fn attribute(&self, _subdev: &str, entry: &str) -> Option<String> {
        match entry {
            "flash_type" => self.config.flash_type.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dev: &mut DummyController, reg: u32, value: u32) {
        dev.bar_write(0x40000 + u64::from(reg), &value.to_le_bytes())
            .unwrap();
    }

    fn read(dev: &mut DummyController, reg: u32) -> u32 {
        let mut buf = [0u8; 4];
        dev.bar_read(0x40000 + u64::from(reg), &mut buf).unwrap();
        u32::from_le_bytes(buf)
    }

    #[test]
    fn test_idle_status() {
        let mut dev = DummyController::new(DummyConfig::default());
        let status = read(&mut dev, reg::ISR);
        assert_ne!(status & isr::GEN_FIFO_EMPTY, 0);
        assert_ne!(status & isr::TX_EMPTY, 0);
        assert_ne!(status & isr::RX_EMPTY, 0);
        assert_eq!(status & isr::RX_NOT_EMPTY, 0);
    }

    #[test]
    fn test_entries_wait_for_enable() {
        let mut dev = DummyController::new(DummyConfig::default());
        write(&mut dev, reg::GEN_FIFO, 0xF405);
        assert_eq!(read(&mut dev, reg::ISR) & isr::GEN_FIFO_EMPTY, 0);
        write(&mut dev, reg::EN, 1);
        assert_ne!(read(&mut dev, reg::ISR) & isr::GEN_FIFO_EMPTY, 0);
    }

    #[test]
    fn test_striped_read_id() {
        let mut dev = DummyController::new(DummyConfig::default());
        write(&mut dev, reg::EN, 1);
        write(&mut dev, reg::TXD, 0x9F);
        write(&mut dev, reg::GEN_FIFO, 0xF405);
        write(&mut dev, reg::GEN_FIFO, 0x1_F501);
        write(&mut dev, reg::GEN_FIFO, 0x6_F506);
        assert_eq!(read(&mut dev, reg::RXD), 0xBBBB_2020);
        assert_eq!(read(&mut dev, reg::RXD), 0x0000_2020);
        write(&mut dev, reg::GEN_FIFO, 0xC004);
        assert_eq!(dev.command_log().len(), 2);
        assert_eq!(dev.command_log()[1].chip, 1);
    }

    #[test]
    fn test_tx_entry_waits_for_data() {
        let mut dev = DummyController::new(DummyConfig::default());
        write(&mut dev, reg::EN, 1);
        write(&mut dev, reg::GEN_FIFO, 0xF405);
        // 5 byte TX with only one word queued
        write(&mut dev, reg::TXD, 0x0000_00DC);
        write(&mut dev, reg::GEN_FIFO, 0x1_F505);
        assert!(dev.active.is_some());
        write(&mut dev, reg::TXD, 0x0000_0000);
        assert!(dev.active.is_none());
        write(&mut dev, reg::GEN_FIFO, 0xC004);
        let cmd = &dev.command_log()[0];
        assert_eq!(cmd.opcode, 0xDC);
        assert_eq!(cmd.address, Some(0));
    }

    #[test]
    fn test_unplugged_reads_all_ones() {
        let mut dev = DummyController::new(DummyConfig::default());
        dev.unplug();
        assert_eq!(read(&mut dev, reg::ISR), u32::MAX);
        assert_eq!(read(&mut dev, reg::SEL), u32::MAX);
    }

    #[test]
    fn test_logical_layout() {
        let mut dev = DummyController::new(DummyConfig::default());
        dev.load_logical(4, &[1, 2, 3, 4]);
        assert_eq!(dev.chip_contents(0)[2..4], [1, 3]);
        assert_eq!(dev.chip_contents(1)[2..4], [2, 4]);
        assert_eq!(dev.logical_contents()[4..8], [1, 2, 3, 4]);
    }
}
