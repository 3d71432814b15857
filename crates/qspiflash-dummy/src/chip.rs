//! Emulated SPI NOR flash chip
//!
//! The chip sees a transaction as a stream of bytes clocked in while chip
//! select is asserted. Read-type commands answer byte by byte as data is
//! clocked out; write-type commands take effect when chip select is
//! released.

use std::collections::HashMap;

use qspiflash_core::opcodes;

/// Configuration of one emulated chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipConfig {
    /// Manufacturer, type and capacity bytes returned by READ_ID
    pub jedec_id: [u8; 3],
    /// Size of the array in bytes
    pub size: usize,
    /// Whether a chip is fitted; an absent chip reads as all ones
    pub present: bool,
    /// Status reads that report busy after each program or erase
    pub busy_polls: u32,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            // Micron MT25QU512
            jedec_id: [0x20, 0xBB, 0x20],
            size: 1024 * 1024,
            present: true,
            busy_polls: 2,
        }
    }
}

/// A command as the chip decoded it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    /// Chip index: 0 for the lower bus, 1 for the upper bus
    pub chip: usize,
    /// Opcode byte
    pub opcode: u8,
    /// Decoded address for addressed commands
    pub address: Option<u32>,
    /// Bytes clocked in after the opcode and address
    pub payload: Vec<u8>,
}

/// One emulated flash chip
#[derive(Debug, Clone)]
pub struct FlashChip {
    index: usize,
    config: ChipConfig,
    data: Vec<u8>,
    write_enabled: bool,
    four_byte: bool,
    busy_polls: u32,
    stuck_busy: bool,
    status_reg: u8,
    ext_addr: u8,
    stuck_low: HashMap<usize, u8>,
    selected: bool,
    tx: Vec<u8>,
    rx_count: usize,
}

fn is_read(op: u8) -> bool {
    matches!(
        op,
        opcodes::READ
            | opcodes::READ_4B
            | opcodes::FAST_READ
            | opcodes::FAST_READ_4B
            | opcodes::DOR
            | opcodes::DOR_4B
            | opcodes::QOR
            | opcodes::QOR_4B
    )
}

fn is_program(op: u8) -> bool {
    matches!(
        op,
        opcodes::PP | opcodes::PP_4B | opcodes::QPP | opcodes::QPP_4B
    )
}

fn erase_size(op: u8) -> Option<usize> {
    match op {
        opcodes::SE_20 => Some(opcodes::SUBSECTOR_SIZE as usize),
        opcodes::BE_D8 | opcodes::BE_DC => Some(opcodes::SECTOR_SIZE as usize),
        _ => None,
    }
}

impl FlashChip {
    /// Create an erased chip
    pub fn new(index: usize, config: ChipConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            index,
            config,
            data,
            write_enabled: false,
            four_byte: false,
            busy_polls: 0,
            stuck_busy: false,
            status_reg: 0,
            ext_addr: 0,
            stuck_low: HashMap::new(),
            selected: false,
            tx: Vec::new(),
            rx_count: 0,
        }
    }

    /// Array contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable array contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Whether 4-byte addressing is active
    pub fn four_byte_mode(&self) -> bool {
        self.four_byte
    }

    /// Keep the chip busy forever
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Force bits in `mask` to read as zero at `addr`
    pub fn stick_bits_low(&mut self, addr: usize, mask: u8) {
        *self.stuck_low.entry(addr).or_default() |= mask;
    }

    fn busy(&self) -> bool {
        self.stuck_busy || self.busy_polls > 0
    }

    fn status(&self) -> u8 {
        let mut sr = self.status_reg & !(opcodes::SR_WIP | opcodes::SR_WEL);
        if self.busy() {
            sr |= opcodes::SR_WIP;
        }
        if self.write_enabled {
            sr |= opcodes::SR_WEL;
        }
        sr
    }

    fn address_len(&self, op: u8) -> usize {
        if opcodes::is_4b_opcode(op) || self.four_byte {
            4
        } else {
            3
        }
    }

    fn is_addressed(op: u8) -> bool {
        is_read(op) || is_program(op) || erase_size(op).is_some()
    }

    /// Decode opcode, address and payload of the current transaction
    fn decode(&self) -> Option<CommandRecord> {
        let (&opcode, rest) = self.tx.split_first()?;
        let (address, payload) = if Self::is_addressed(opcode) {
            let n = self.address_len(opcode);
            if rest.len() < n {
                return None;
            }
            let addr = rest[..n]
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
            (Some(addr), rest[n..].to_vec())
        } else {
            (None, rest.to_vec())
        };
        Some(CommandRecord {
            chip: self.index,
            opcode,
            address,
            payload,
        })
    }

    fn read_byte(&self, addr: usize) -> u8 {
        let addr = addr % self.data.len();
        let mask = self.stuck_low.get(&addr).copied().unwrap_or(0);
        self.data[addr] & !mask
    }

    /// Chip select asserted
    pub fn select(&mut self) {
        self.selected = true;
        self.tx.clear();
        self.rx_count = 0;
    }

    /// Whether chip select is asserted
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// A byte clocked in from the host
    pub fn clock_in(&mut self, byte: u8) {
        if self.selected {
            self.tx.push(byte);
        }
    }

    /// A byte clocked out to the host
    pub fn clock_out(&mut self) -> u8 {
        if !self.config.present || !self.selected {
            return 0xFF;
        }
        let n = self.rx_count;
        self.rx_count += 1;
        let Some(&opcode) = self.tx.first() else {
            return 0xFF;
        };
        match opcode {
            opcodes::RDSR => self.status(),
            opcodes::RDFSR => {
                if self.busy() {
                    0
                } else {
                    opcodes::FSR_READY
                }
            }
            opcodes::RDEAR => self.ext_addr,
            opcodes::RDCR => 0,
            opcodes::RDID => self.config.jedec_id.get(n).copied().unwrap_or(0),
            op if is_read(op) => match self.decode().and_then(|c| c.address) {
                Some(addr) => self.read_byte(addr as usize + n),
                None => 0xFF,
            },
            _ => 0xFF,
        }
    }

    /// Chip select released; returns the command executed, if any
    pub fn deselect(&mut self) -> Option<CommandRecord> {
        if !self.selected {
            return None;
        }
        self.selected = false;
        if !self.config.present {
            return None;
        }
        let record = self.decode()?;
        self.execute(&record);
        Some(record)
    }

    fn execute(&mut self, cmd: &CommandRecord) {
        match cmd.opcode {
            opcodes::WREN => self.write_enabled = true,
            opcodes::WRDI => self.write_enabled = false,
            opcodes::EN4B => self.four_byte = true,
            opcodes::EX4B => self.four_byte = false,
            opcodes::RDSR => {
                self.busy_polls = self.busy_polls.saturating_sub(1);
            }
            opcodes::WRSR if self.write_enabled => {
                if let Some(&sr) = cmd.payload.first() {
                    self.status_reg = sr;
                }
                self.write_enabled = false;
            }
            opcodes::WREAR if self.write_enabled => {
                if let Some(&ear) = cmd.payload.first() {
                    self.ext_addr = ear;
                }
                self.write_enabled = false;
            }
            opcodes::CE_C7 if self.write_enabled => {
                self.data.fill(0xFF);
                self.finish_write();
            }
            op if is_program(op) && self.write_enabled => {
                let addr = cmd.address.unwrap_or(0) as usize;
                let page = addr & !(opcodes::PAGE_SIZE - 1);
                let size = self.data.len();
                for (i, &b) in cmd.payload.iter().enumerate() {
                    let a = page + ((addr + i) % opcodes::PAGE_SIZE);
                    self.data[a % size] &= b;
                }
                self.finish_write();
            }
            op if erase_size(op).is_some() && self.write_enabled => {
                let len = erase_size(op).unwrap_or(0);
                let start = cmd.address.unwrap_or(0) as usize & !(len - 1);
                if start < self.data.len() {
                    let end = (start + len).min(self.data.len());
                    self.data[start..end].fill(0xFF);
                } else {
                    log::warn!("chip {}: erase at 0x{:X} beyond array", self.index, start);
                }
                self.finish_write();
            }
            op if is_program(op) || erase_size(op).is_some() || op == opcodes::CE_C7 => {
                log::warn!("chip {}: opcode 0x{:02X} without write enable", self.index, op);
            }
            _ => {}
        }
    }

    fn finish_write(&mut self) {
        self.write_enabled = false;
        self.busy_polls = self.config.busy_polls;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chip: &mut FlashChip, tx: &[u8], rx: usize) -> Vec<u8> {
        chip.select();
        for &b in tx {
            chip.clock_in(b);
        }
        let out = (0..rx).map(|_| chip.clock_out()).collect();
        chip.deselect();
        out
    }

    #[test]
    fn test_read_id() {
        let mut chip = FlashChip::new(0, ChipConfig::default());
        assert_eq!(run(&mut chip, &[opcodes::RDID], 3), vec![0x20, 0xBB, 0x20]);
    }

    #[test]
    fn test_program_needs_write_enable() {
        let mut chip = FlashChip::new(0, ChipConfig::default());
        run(&mut chip, &[opcodes::PP, 0, 0, 0, 0x00], 0);
        assert_eq!(chip.data()[0], 0xFF);

        run(&mut chip, &[opcodes::WREN], 0);
        run(&mut chip, &[opcodes::PP, 0, 0, 0, 0x5A], 0);
        assert_eq!(chip.data()[0], 0x5A);
    }

    #[test]
    fn test_program_wraps_within_page() {
        let mut chip = FlashChip::new(0, ChipConfig::default());
        run(&mut chip, &[opcodes::WREN], 0);
        run(&mut chip, &[opcodes::PP, 0, 0x01, 0xFF, 0x11, 0x22], 0);
        assert_eq!(chip.data()[0x1FF], 0x11);
        assert_eq!(chip.data()[0x100], 0x22);
    }

    #[test]
    fn test_busy_after_erase() {
        let mut chip = FlashChip::new(0, ChipConfig::default());
        run(&mut chip, &[opcodes::WREN], 0);
        run(&mut chip, &[opcodes::BE_DC, 0, 0, 0, 0], 0);
        assert_eq!(run(&mut chip, &[opcodes::RDSR], 1), vec![opcodes::SR_WIP]);
        assert_eq!(run(&mut chip, &[opcodes::RDSR], 1), vec![opcodes::SR_WIP]);
        assert_eq!(run(&mut chip, &[opcodes::RDSR], 1), vec![0]);
    }

    #[test]
    fn test_address_width_follows_mode() {
        let mut chip = FlashChip::new(0, ChipConfig::default());
        chip.data_mut()[0x010203] = 0xAB;
        assert_eq!(run(&mut chip, &[opcodes::READ, 1, 2, 3], 1), vec![0xAB]);
        run(&mut chip, &[opcodes::EN4B], 0);
        assert!(chip.four_byte_mode());
        assert_eq!(run(&mut chip, &[opcodes::READ, 0, 1, 2, 3], 1), vec![0xAB]);
    }

    #[test]
    fn test_absent_chip_reads_ones() {
        let config = ChipConfig {
            present: false,
            ..Default::default()
        };
        let mut chip = FlashChip::new(1, config);
        assert_eq!(run(&mut chip, &[opcodes::RDSR], 2), vec![0xFF, 0xFF]);
    }
}
