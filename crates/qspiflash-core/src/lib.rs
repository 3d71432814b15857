//! qspiflash-core - Core types for in-band QSPI flash programming
//!
//! This crate holds the pieces shared by every layer of the flasher:
//! the error type, the PCIe device contract, the clock used for bounded
//! polling, progress reporting, connection topology and the JEDEC
//! opcode/size constants. It is `no_std` (with `alloc`) so the same
//! definitions can back both the host tool and the emulator.
//!
//! # Features
//!
//! - `std` - Enable `std::error::Error` and the [`clock::StdClock`]

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod cancel;
pub mod clock;
pub mod device;
pub mod error;
pub mod opcodes;
pub mod progress;
pub mod topology;

pub use cancel::CancelToken;
pub use clock::{Clock, Deadline};
pub use device::PcieDevice;
pub use error::{Error, Result, WaitCondition};
pub use progress::{NoProgress, Phase, UpgradeProgress};
pub use topology::{BusWidth, ConnectMode, Topology};
