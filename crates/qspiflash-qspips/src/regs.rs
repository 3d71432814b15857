//! GQSPI register map
//!
//! Offsets are relative to the flash controller window inside the BAR
//! (see [`crate::QspiPsConfig::flash_base`]).

use bitflags::bitflags;

/// Register offsets
pub mod offset {
    /// Configuration
    pub const CFG: u32 = 0x100;
    /// Interrupt status
    pub const ISR: u32 = 0x104;
    /// Interrupt enable
    pub const IER: u32 = 0x108;
    /// Interrupt disable
    pub const IDR: u32 = 0x10C;
    /// Interrupt mask
    pub const IMR: u32 = 0x110;
    /// Controller enable
    pub const EN: u32 = 0x114;
    /// TX data FIFO
    pub const TXD: u32 = 0x11C;
    /// RX data FIFO
    pub const RXD: u32 = 0x120;
    /// TX FIFO threshold
    pub const TX_THRESH: u32 = 0x128;
    /// RX FIFO threshold
    pub const RX_THRESH: u32 = 0x12C;
    /// GPIO (write protect)
    pub const GPIO: u32 = 0x130;
    /// Loopback master clock delay
    pub const LPBK_DLY_ADJ: u32 = 0x138;
    /// Generic FIFO
    pub const GEN_FIFO: u32 = 0x140;
    /// Select GQSPI or legacy LQSPI
    pub const SEL: u32 = 0x144;
    /// FIFO control (reset)
    pub const FIFO_CTRL: u32 = 0x14C;
    /// Generic FIFO threshold
    pub const GF_THRESH: u32 = 0x150;
    /// Poll configuration
    pub const POLL_CFG: u32 = 0x154;
    /// Poll timeout
    pub const P_TIMEOUT: u32 = 0x158;
    /// RX data delay
    pub const DATA_DLY_ADJ: u32 = 0x1F8;
    /// Module identification
    pub const MOD_ID: u32 = 0x1FC;
}

bitflags! {
    /// Configuration register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Config: u32 {
        /// Clock polarity outside transfers
        const CLK_POL = 0x0000_0002;
        /// Clock phase
        const CLK_PHA = 0x0000_0004;
        /// Baud rate divisor field
        const BAUD_RATE_DIV = 0x0000_0038;
        /// Write protect / hold lines driven
        const WP_HOLD = 0x0008_0000;
        /// Enable poll timeout
        const EN_POLL_TO = 0x0010_0000;
        /// Big-endian data
        const ENDIAN = 0x0400_0000;
        /// Start executing the generic FIFO
        const START_GEN_FIFO = 0x1000_0000;
        /// Generic FIFO manual start
        const GEN_FIFO_START_MODE = 0x2000_0000;
        /// Mode field (IO vs DMA)
        const MODE_EN = 0xC000_0000;

        const _ = !0;
    }
}

/// Baud divisor value of 8, pre-shifted into [`Config::BAUD_RATE_DIV`]
pub const BAUD_RATE_DIV_8: u32 = 0x10;

bitflags! {
    /// Interrupt status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Isr: u32 {
        /// Poll timeout, write to clear
        const WR_TO_CLR = 0x0000_0002;
        /// TX FIFO below threshold
        const TX_NOT_FULL = 0x0000_0004;
        /// TX FIFO full
        const TX_FULL = 0x0000_0008;
        /// RX FIFO holds at least the threshold
        const RX_NOT_EMPTY = 0x0000_0010;
        /// RX FIFO full
        const RX_FULL = 0x0000_0020;
        /// Generic FIFO empty
        const GEN_FIFO_EMPTY = 0x0000_0080;
        /// TX FIFO empty
        const TX_EMPTY = 0x0000_0100;
        /// Generic FIFO not full
        const GEN_FIFO_NOT_FULL = 0x0000_0200;
        /// Generic FIFO full
        const GEN_FIFO_FULL = 0x0000_0400;
        /// RX FIFO empty
        const RX_EMPTY = 0x0000_0800;

        const _ = !0;
    }
}

/// Value written to IDR to mask every interrupt source
pub const IDR_ALL: u32 = 0x0FBE;

/// Controller enable value
pub const ENABLE: u32 = 0x1;

/// SEL value routing the window to the generic-FIFO controller
pub const SEL_GQSPI: u32 = 0x1;

/// FIFO control reset bits
pub mod fifo_ctrl {
    /// Reset the generic FIFO
    pub const RST_GEN_FIFO: u32 = 0x1;
    /// Reset the TX FIFO
    pub const RST_TX_FIFO: u32 = 0x2;
    /// Reset the RX FIFO
    pub const RST_RX_FIFO: u32 = 0x4;
}

/// Threshold reset values
pub mod thresh {
    /// TX FIFO threshold after reset
    pub const TX_RESET: u32 = 0x01;
    /// RX FIFO threshold after reset, in words
    pub const RX_RESET: u32 = 0x01;
    /// Generic FIFO threshold after reset
    pub const GF_RESET: u32 = 0x10;
}

/// Bytes of TX data queued per fill of the TX FIFO
pub const TXD_DEPTH: usize = 64;

/// Generic FIFO entry fields
pub mod genfifo {
    /// Immediate data / length field
    pub const IMM_DATA: u32 = 0x0000_00FF;
    /// Entry carries a data transfer
    pub const DATA_XFER: u32 = 0x0000_0100;
    /// Immediate field is an exponent (length 2^imm)
    pub const EXP: u32 = 0x0000_0200;
    /// Lowest count bit that exponent entries cover
    pub const EXP_START: u32 = 0x0000_0100;
    /// First exponent emitted for large transfers
    pub const EXP_FIRST: u32 = 8;
    /// SPI mode field
    pub const MODE_MASK: u32 = 0x0000_0C00;
    /// Single data line
    pub const MODE_SPI: u32 = 0x0000_0400;
    /// Two data lines
    pub const MODE_DUALSPI: u32 = 0x0000_0800;
    /// Four data lines
    pub const MODE_QUADSPI: u32 = 0x0000_0C00;
    /// Chip select lower
    pub const CS_LOWER: u32 = 0x0000_1000;
    /// Chip select upper
    pub const CS_UPPER: u32 = 0x0000_2000;
    /// Chip select both
    pub const CS_BOTH: u32 = 0x0000_3000;
    /// Lower data bus
    pub const BUS_LOWER: u32 = 0x0000_4000;
    /// Upper data bus
    pub const BUS_UPPER: u32 = 0x0000_8000;
    /// Both data buses
    pub const BUS_BOTH: u32 = 0x0000_C000;
    /// Transmit
    pub const TX: u32 = 0x0001_0000;
    /// Receive
    pub const RX: u32 = 0x0002_0000;
    /// Stripe data across both buses
    pub const STRIPE: u32 = 0x0004_0000;
    /// Poll
    pub const POLL: u32 = 0x0008_0000;
    /// Chip select setup time, in clocks
    pub const CS_SETUP: u32 = 0x05;
    /// Chip select hold time, in clocks
    pub const CS_HOLD: u32 = 0x04;
}
