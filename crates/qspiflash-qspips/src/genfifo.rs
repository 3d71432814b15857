//! Generic FIFO entry encoding
//!
//! These functions only compute entry words; nothing here touches the
//! hardware. A data phase of `n` bytes becomes one immediate entry when
//! `n < 255`, otherwise a run of exponent entries (one per set bit of `n`
//! at or above bit 8, each meaning `2^k` bytes) followed by an immediate
//! entry for `n & 0xFF` when that is non-zero.

use qspiflash_core::Topology;

use crate::regs::genfifo::*;

/// Mode bits for a data phase on `lines` data lines
///
/// Anything other than 2 or 4 falls back to single-line SPI.
pub const fn select_spi_mode(lines: u8) -> u32 {
    match lines {
        2 => MODE_DUALSPI,
        4 => MODE_QUADSPI,
        _ => MODE_SPI,
    }
}

/// Bus and chip-select bits for `topology`
pub const fn bus_and_cs(topology: Topology) -> u32 {
    if topology.is_dual() {
        BUS_BOTH | CS_BOTH
    } else {
        BUS_LOWER | CS_LOWER
    }
}

/// Entry asserting chip select
pub const fn cs_assert(topology: Topology) -> u32 {
    MODE_SPI | bus_and_cs(topology) | CS_SETUP
}

/// Entry deasserting chip select
pub const fn cs_deassert(topology: Topology) -> u32 {
    let bus = if topology.is_dual() {
        BUS_BOTH
    } else {
        BUS_LOWER
    };
    bus | CS_HOLD
}

/// Common bits of a data entry: mode, bus/CS and striping
pub const fn data_base(topology: Topology, lines: u8, stripe: bool) -> u32 {
    let mut entry = select_spi_mode(lines) | bus_and_cs(topology);
    if stripe {
        entry |= STRIPE;
    }
    entry
}

/// Entries describing a data phase of `count` bytes (or clocks)
///
/// `entry` carries the direction, mode, bus and stripe bits; its immediate
/// and exponent fields are overwritten.
pub fn data_entries(entry: u32, count: u32) -> DataEntries {
    let base = entry & !(IMM_DATA | EXP);
    if count < IMM_DATA {
        DataEntries {
            base,
            remaining: 0,
            exponent: EXP_FIRST,
            tail: Some(count),
        }
    } else {
        let tail = count & IMM_DATA;
        DataEntries {
            base,
            remaining: count,
            exponent: EXP_FIRST,
            tail: (tail != 0).then_some(tail),
        }
    }
}

/// Iterator over generic FIFO words for one data phase
#[derive(Debug, Clone)]
pub struct DataEntries {
    base: u32,
    remaining: u32,
    exponent: u32,
    tail: Option<u32>,
}

impl Iterator for DataEntries {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.remaining != 0 {
            let hit = self.remaining & EXP_START != 0;
            let exponent = self.exponent;
            self.remaining >>= 1;
            self.exponent += 1;
            if hit {
                return Some(self.base | EXP | exponent);
            }
        }
        self.tail.take().map(|imm| self.base | imm)
    }
}

/// Bytes (or clocks) a single data entry stands for
pub const fn entry_length(word: u32) -> u64 {
    let imm = word & IMM_DATA;
    if word & EXP != 0 {
        1u64 << imm
    } else {
        imm as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspiflash_core::ConnectMode;

    fn single() -> Topology {
        Topology {
            connect: ConnectMode::Single,
            ..Default::default()
        }
    }

    #[test]
    fn test_cs_words() {
        assert_eq!(cs_assert(Topology::default()), 0xF405);
        assert_eq!(cs_deassert(Topology::default()), 0xC004);
        assert_eq!(cs_assert(single()), 0x5405);
        assert_eq!(cs_deassert(single()), 0x4004);
    }

    #[test]
    fn test_select_spi_mode_fallback() {
        assert_eq!(select_spi_mode(1), MODE_SPI);
        assert_eq!(select_spi_mode(2), MODE_DUALSPI);
        assert_eq!(select_spi_mode(4), MODE_QUADSPI);
        assert_eq!(select_spi_mode(3), MODE_SPI);
        assert_eq!(select_spi_mode(0), MODE_SPI);
    }

    #[test]
    fn test_data_base_bits() {
        let entry = data_base(Topology::default(), 4, true);
        assert_eq!(entry, MODE_QUADSPI | BUS_BOTH | CS_BOTH | STRIPE);
        let entry = data_base(single(), 1, false);
        assert_eq!(entry, MODE_SPI | BUS_LOWER | CS_LOWER);
    }

    #[test]
    fn test_small_count_is_one_immediate() {
        let words: Vec<u32> = data_entries(DATA_XFER | TX, 5).collect();
        assert_eq!(words, vec![DATA_XFER | TX | 5]);

        let words: Vec<u32> = data_entries(DATA_XFER, 0).collect();
        assert_eq!(words, vec![DATA_XFER]);
    }

    #[test]
    fn test_page_is_one_exponent_entry() {
        let words: Vec<u32> = data_entries(DATA_XFER | RX, 256).collect();
        assert_eq!(words, vec![DATA_XFER | RX | EXP | 8]);
    }

    #[test]
    fn test_mixed_count() {
        // 0x1_2345 = 2^16 + 2^13 + 2^9 + 2^8 + 0x45
        let words: Vec<u32> = data_entries(DATA_XFER | RX, 0x1_2345).collect();
        assert_eq!(
            words,
            vec![
                DATA_XFER | RX | EXP | 8,
                DATA_XFER | RX | EXP | 9,
                DATA_XFER | RX | EXP | 13,
                DATA_XFER | RX | EXP | 16,
                DATA_XFER | RX | 0x45,
            ]
        );
    }

    #[test]
    fn test_255_uses_immediate_path() {
        // 255 is not below the immediate limit; it has no bits above 7
        let words: Vec<u32> = data_entries(DATA_XFER, 255).collect();
        assert_eq!(words, vec![DATA_XFER | 255]);
    }

    #[test]
    fn test_lengths_sum_to_count() {
        let counts = [0u32, 1, 4, 254, 255, 256, 257, 511, 512, 4095, 8192, 65_537, 0x00FF_FFFF];
        for count in counts {
            let total: u64 = data_entries(DATA_XFER | TX, count).map(entry_length).sum();
            assert_eq!(total, u64::from(count), "count {}", count);
        }
        for count in (0..5000u32).step_by(7) {
            let total: u64 = data_entries(DATA_XFER, count).map(entry_length).sum();
            assert_eq!(total, u64::from(count));
        }
    }

    #[test]
    fn test_exponents_strictly_increase() {
        let exps: Vec<u32> = data_entries(DATA_XFER, 0xFFFF_FF00)
            .filter(|w| w & EXP != 0)
            .map(|w| w & IMM_DATA)
            .collect();
        assert_eq!(exps, (8..32).collect::<Vec<_>>());
    }
}
