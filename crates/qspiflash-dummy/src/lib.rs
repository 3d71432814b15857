//! qspiflash-dummy - In-memory GQSPI controller for testing
//!
//! [`DummyController`] implements [`qspiflash_core::PcieDevice`] over a
//! register-level model of the GQSPI controller with one or two emulated
//! SPI NOR chips behind it. It records every generic FIFO entry and every
//! decoded flash command so tests can assert on the exact bus traffic.
//!
//! # Example
//!
//! ```
//! use qspiflash_dummy::{DummyConfig, DummyController};
//!
//! let mut dev = DummyController::new(DummyConfig::default());
//! dev.load_logical(0, &[1, 2, 3, 4]);
//! assert_eq!(dev.chip_contents(0)[..2], [1, 3]);
//! assert_eq!(dev.chip_contents(1)[..2], [2, 4]);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod chip;
mod clock;
mod controller;

pub use chip::{ChipConfig, CommandRecord, FlashChip};
pub use clock::ManualClock;
pub use controller::DummyController;

/// Offset of the controller registers the emulator answers at
pub const DEFAULT_FLASH_BASE: u64 = 0x04_0000;

/// Emulator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Value of the `flash_type` attribute; `None` when absent
    pub flash_type: Option<String>,
    /// Chip on the lower bus
    pub lower: ChipConfig,
    /// Chip on the upper bus
    pub upper: ChipConfig,
    /// BAR offset of the register window
    pub flash_base: u64,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            flash_type: None,
            lower: ChipConfig::default(),
            upper: ChipConfig::default(),
            flash_base: DEFAULT_FLASH_BASE,
        }
    }
}
