//! qspiflash-qspips - GQSPI (QSPI-PS) flash controller driver
//!
//! This crate programs the QSPI boot flash of a PCIe accelerator card
//! through the GQSPI controller exposed in one of the card's BARs. The
//! controller is driven in polled IO mode: the host pushes generic FIFO
//! entries that assert chip select, move data and deassert chip select,
//! and feeds or drains the data FIFOs while they run.
//!
//! # Layers
//!
//! - [`registers`] - 32-bit register reads and writes inside the BAR
//! - [`genfifo`] - pure generic FIFO entry encoding
//! - [`controller`] and [`transfer`] - controller bring-up, bounded waits
//!   and the message transfer engine
//! - [`protocol`] - flash commands (ID, status, erase, program, read)
//! - [`upgrade`] and [`ops`] - the firmware upgrade sequence, read-out,
//!   range erase and diagnostics
//!
//! # Example
//!
//! ```no_run
//! use qspiflash_core::{clock::StdClock, NoProgress, PcieDevice};
//! use qspiflash_qspips::{QspiPsConfig, QspiPsFlasher};
//!
//! fn flash<D: PcieDevice>(dev: D) -> qspiflash_core::Result<()> {
//!     let mut flasher = QspiPsFlasher::new(dev, StdClock::new(), QspiPsConfig::default());
//!     let mut image = std::io::Cursor::new(vec![0u8; 4096]);
//!     let report = flasher.upgrade_firmware(&mut image, &mut NoProgress)?;
//!     println!("programmed {} pages", report.pages_programmed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod controller;
mod flasher;
pub mod genfifo;
pub mod message;
pub mod ops;
pub mod protocol;
pub mod registers;
pub mod regs;
pub mod transfer;
pub mod upgrade;

pub use controller::Gqspi;
pub use flasher::{QspiPsConfig, QspiPsFlasher, BUFFER_SIZE, DEFAULT_FLASH_BASE};
pub use message::Message;
pub use ops::FlashDiagnostics;
pub use protocol::FlashId;
pub use upgrade::{UpgradeReport, UpgradeState};
