//! qspiflash-flash - Flash type detection and backend dispatch
//!
//! The CLI only uses types from this crate and `qspiflash-core`. A
//! [`Flasher`] wraps whichever controller driver matches the card's flash
//! type:
//!
//! ```text
//!   CLI ──> Flasher ──> QspiPsFlasher (qspi_ps*)
//!                  └──> Unsupported   (spi*, ospi_versal*)
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod flash_type;
mod flasher;

pub use flash_type::FlashType;
pub use flasher::{Flasher, FlasherOptions, Image};

pub use qspiflash_qspips::{FlashDiagnostics, QspiPsConfig, UpgradeReport, UpgradeState};
