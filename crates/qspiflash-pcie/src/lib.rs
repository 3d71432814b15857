//! qspiflash-pcie - PCIe BAR access through sysfs
//!
//! Implements [`qspiflash_core::PcieDevice`] for a PCI function on Linux by
//! memory mapping its `resource<N>` file. Attribute lookups such as
//! `flash_type` read files in the device's sysfs directory or in one of its
//! sub-device directories.
//!
//! # Example
//!
//! ```no_run
//! use qspiflash_pcie::{PciAddress, SysfsDevice};
//!
//! let address: PciAddress = "0000:65:00.0".parse()?;
//! let _dev = SysfsDevice::open(address, 0, 0)?;
//! # Ok::<(), qspiflash_pcie::PcieError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod address;
mod device;
mod error;

pub use address::PciAddress;
pub use device::{SysfsDevice, SYSFS_PCI_DEVICES};
pub use error::{PcieError, Result};
