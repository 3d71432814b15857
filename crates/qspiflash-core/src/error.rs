//! Error types for qspiflash-core
//!
//! This module provides a no_std compatible error type that is shared by
//! the controller driver, the emulator and the dispatcher.

use core::fmt;

/// Linux errno values used as process exit codes by the CLI
mod errno {
    pub const EIO: i32 = 5;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const EFBIG: i32 = 27;
    pub const EOPNOTSUPP: i32 = 95;
    pub const ETIMEDOUT: i32 = 110;
    pub const ECANCELED: i32 = 125;
}

/// Hardware condition a bounded poll was waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Controller generic FIFO drained
    GenFifoEmpty,
    /// Controller TX data FIFO drained
    TxEmpty,
    /// Flash status register busy bit cleared
    FlashReady,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Register access errors
    /// A BAR read failed
    RegisterRead {
        /// Register offset inside the flash controller window
        offset: u32,
    },
    /// A BAR write failed
    RegisterWrite {
        /// Register offset inside the flash controller window
        offset: u32,
    },
    /// The status register read back as all ones
    DeviceUnreachable,

    // Protocol errors
    /// A bounded poll ran past its deadline
    Timeout(WaitCondition),
    /// TX FIFO was full when a new command was about to be queued
    TxFifoFull,
    /// No flash answered the READ_ID command
    FlashNotDetected,

    // Operation errors
    /// Read-back after programming differs from the image
    VerifyError {
        /// Number of pages that differ
        pages: u32,
        /// Index of the first page that differs
        first_page: u32,
    },
    /// Image does not fit the 32-bit flash address space
    ImageTooLarge,
    /// Reading the firmware image or writing a dump failed
    IoError,
    /// Argument outside what the hardware can express
    InvalidArgument(&'static str),

    // Control errors
    /// Operation was cancelled through a [`crate::CancelToken`]
    Cancelled,
    /// Requested backend or operation is not available
    Unsupported(&'static str),
}

impl Error {
    /// Errno-style code for this error, used as the CLI exit status
    pub const fn errno(&self) -> i32 {
        match self {
            Self::RegisterRead { .. } | Self::RegisterWrite { .. } | Self::IoError => errno::EIO,
            Self::DeviceUnreachable => errno::ENODEV,
            Self::Timeout(_) => errno::ETIMEDOUT,
            Self::TxFifoFull | Self::VerifyError { .. } => errno::EIO,
            Self::FlashNotDetected | Self::Unsupported(_) => errno::EOPNOTSUPP,
            Self::ImageTooLarge => errno::EFBIG,
            Self::InvalidArgument(_) => errno::EINVAL,
            Self::Cancelled => errno::ECANCELED,
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenFifoEmpty => write!(f, "generic FIFO empty"),
            Self::TxEmpty => write!(f, "TX FIFO empty"),
            Self::FlashReady => write!(f, "flash ready"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterRead { offset } => {
                write!(f, "register read failed at offset 0x{:03X}", offset)
            }
            Self::RegisterWrite { offset } => {
                write!(f, "register write failed at offset 0x{:03X}", offset)
            }
            Self::DeviceUnreachable => {
                write!(f, "device unreachable: QSPI status register reads all ones")
            }
            Self::Timeout(cond) => write!(f, "timed out waiting for {}", cond),
            Self::TxFifoFull => write!(f, "TX FIFO full while queuing a command"),
            Self::FlashNotDetected => write!(f, "no flash detected (could not read flash ID)"),
            Self::VerifyError { pages, first_page } => write!(
                f,
                "verify failed: {} page(s) differ, first at page {}",
                pages, first_page
            ),
            Self::ImageTooLarge => write!(f, "image does not fit the flash address space"),
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Unsupported(msg) => write!(f, "not supported: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
