//! Error types for PCIe device access

use thiserror::Error;

/// PCIe device errors
#[derive(Debug, Error)]
pub enum PcieError {
    /// The device address could not be parsed
    #[error("Invalid PCI address '{0}', expected [DDDD:]BB:DD.F")]
    InvalidAddress(String),

    /// No such device in sysfs
    #[error("PCI device {0} not found")]
    DeviceNotFound(String),

    /// Failed to open the BAR resource file
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The BAR exists but has no memory behind it
    #[error("BAR {bar} of {bdf} is not a memory BAR")]
    EmptyBar { bdf: String, bar: u8 },

    /// mmap of the BAR failed
    #[error("Failed to map BAR {bar} ({size} bytes): {source}")]
    MapFailed {
        bar: u8,
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// Access outside the mapped BAR
    #[error("Access of {len} bytes at 0x{offset:X} is outside the {size} byte BAR")]
    OutOfRange { offset: u64, len: usize, size: usize },

    /// BAR access is only implemented on Linux
    #[error("PCIe BAR access is not supported on this platform")]
    Unsupported,
}

impl PcieError {
    /// The core error this maps to at the device trait boundary
    pub fn as_core(&self) -> qspiflash_core::Error {
        use qspiflash_core::Error;
        match self {
            Self::InvalidAddress(_) => Error::InvalidArgument("invalid PCI address"),
            Self::DeviceNotFound(_) | Self::EmptyBar { .. } => Error::DeviceUnreachable,
            Self::OutOfRange { .. } => Error::InvalidArgument("BAR access out of range"),
            Self::Unsupported => Error::Unsupported("PCIe BAR access on this platform"),
            Self::OpenFailed { .. } | Self::MapFailed { .. } => Error::IoError,
        }
    }
}

impl From<PcieError> for qspiflash_core::Error {
    fn from(e: PcieError) -> Self {
        e.as_core()
    }
}

/// Result type for PCIe operations
pub type Result<T> = std::result::Result<T, PcieError>;
