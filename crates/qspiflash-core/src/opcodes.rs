//! JEDEC flash opcodes, vendor IDs and geometry used by the QSPI flasher
//!
//! Geometry is fixed at compile time; nothing here is discovered from the
//! device.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;
/// Write Disable - clears WEL bit in status register
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status and configuration registers
// ============================================================================

/// Read Status Register
pub const RDSR: u8 = 0x05;
/// Write Status Register
pub const WRSR: u8 = 0x01;
/// Read Configuration Register
pub const RDCR: u8 = 0x35;
/// Read Flag Status Register (Micron)
pub const RDFSR: u8 = 0x70;
/// Read Extended Address Register (Micron)
pub const RDEAR: u8 = 0xC8;
/// Write Extended Address Register (Micron)
pub const WREAR: u8 = 0xC5;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID
pub const RDID: u8 = 0x9F;

// ============================================================================
// Read commands
// ============================================================================

/// Read Data
pub const READ: u8 = 0x03;
/// Read Data with 4-byte address
pub const READ_4B: u8 = 0x13;
/// Fast Read (8 dummy cycles)
pub const FAST_READ: u8 = 0x0B;
/// Fast Read with 4-byte address
pub const FAST_READ_4B: u8 = 0x0C;
/// Dual Output Read (1-1-2)
pub const DOR: u8 = 0x3B;
/// Dual Output Read with 4-byte address
pub const DOR_4B: u8 = 0x3C;
/// Quad Output Read (1-1-4)
pub const QOR: u8 = 0x6B;
/// Quad Output Read with 4-byte address
pub const QOR_4B: u8 = 0x6C;

// ============================================================================
// Page Program
// ============================================================================

/// Page Program
pub const PP: u8 = 0x02;
/// Page Program with 4-byte address
pub const PP_4B: u8 = 0x12;
/// Quad Page Program (1-1-4)
pub const QPP: u8 = 0x32;
/// Quad Page Program with 4-byte address
pub const QPP_4B: u8 = 0x34;

// ============================================================================
// Erase
// ============================================================================

/// Sub-sector Erase 4KB
pub const SE_20: u8 = 0x20;
/// Sector Erase 64KB
pub const BE_D8: u8 = 0xD8;
/// Sector Erase 64KB with 4-byte address
pub const BE_DC: u8 = 0xDC;
/// Bulk (chip) Erase
pub const CE_C7: u8 = 0xC7;

// ============================================================================
// 4-byte address mode control
// ============================================================================

/// Enter 4-Byte Address Mode
pub const EN4B: u8 = 0xB7;
/// Exit 4-Byte Address Mode
pub const EX4B: u8 = 0xE9;

// ============================================================================
// Status register bits
// ============================================================================

/// Status Register: Write In Progress / Busy
pub const SR_WIP: u8 = 0x01;
/// Status Register: Write Enable Latch
pub const SR_WEL: u8 = 0x02;
/// Flag Status Register: Program/Erase controller ready
pub const FSR_READY: u8 = 0x80;

// ============================================================================
// Response sizes
// ============================================================================

/// Bytes read back for READ_ID (both chips striped in dual mode)
pub const IDCODE_READ_BYTES: usize = 6;
/// Bytes read back for a status register read
pub const STATUS_READ_BYTES: usize = 2;

// ============================================================================
// Geometry
// ============================================================================

/// Program page size in bytes
pub const PAGE_SIZE: usize = 256;
/// Erase sector size in bytes
pub const SECTOR_SIZE: u32 = 0x10000;
/// Erase sub-sector size in bytes
pub const SUBSECTOR_SIZE: u32 = 0x1000;

// ============================================================================
// Vendors
// ============================================================================

/// JEDEC manufacturer ID of Micron
pub const MICRON_VENDOR_ID: u8 = 0x20;
/// JEDEC manufacturer ID of Macronix
pub const MACRONIX_VENDOR_ID: u8 = 0xC2;

/// Flash vendors the flasher recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashVendor {
    /// Micron (MT25Q family)
    Micron,
    /// Macronix (MX25/MX66 family)
    Macronix,
}

impl FlashVendor {
    /// Map a JEDEC manufacturer byte onto a recognized vendor
    pub const fn from_jedec(id: u8) -> Option<Self> {
        match id {
            MICRON_VENDOR_ID => Some(Self::Micron),
            MACRONIX_VENDOR_ID => Some(Self::Macronix),
            _ => None,
        }
    }

    /// Vendor name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Micron => "Micron",
            Self::Macronix => "Macronix",
        }
    }
}

/// Whether `opcode` always carries a 4-byte address regardless of mode
pub const fn is_4b_opcode(opcode: u8) -> bool {
    matches!(
        opcode,
        READ_4B | FAST_READ_4B | DOR_4B | QOR_4B | PP_4B | QPP_4B | BE_DC
    )
}

/// Whether `opcode` is a read that needs 8 dummy cycles after the address
pub const fn needs_dummy_cycles(opcode: u8) -> bool {
    matches!(
        opcode,
        FAST_READ | FAST_READ_4B | DOR | DOR_4B | QOR | QOR_4B
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_width_of_opcodes() {
        assert!(is_4b_opcode(BE_DC));
        assert!(is_4b_opcode(QPP_4B));
        assert!(!is_4b_opcode(QPP));
        assert!(!is_4b_opcode(BE_D8));
    }

    #[test]
    fn test_dummy_cycles() {
        assert!(needs_dummy_cycles(QOR));
        assert!(needs_dummy_cycles(FAST_READ));
        assert!(!needs_dummy_cycles(READ));
        assert!(!needs_dummy_cycles(RDSR));
    }

    #[test]
    fn test_vendor_lookup() {
        assert_eq!(FlashVendor::from_jedec(0x20), Some(FlashVendor::Micron));
        assert_eq!(FlashVendor::from_jedec(0xC2).map(|v| v.name()), Some("Macronix"));
        assert_eq!(FlashVendor::from_jedec(0xEF), None);
    }
}
