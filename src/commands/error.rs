//! Errors raised by the CLI itself

use std::path::PathBuf;

use thiserror::Error;

/// CLI command errors
#[derive(Debug, Error)]
pub enum CommandError {
    /// The user declined the confirmation prompt
    #[error("Aborted by user")]
    Aborted,

    /// An input or output file could not be opened
    #[error("Failed to open {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Erase offset not on a sector boundary
    #[error("Erase offset 0x{offset:08X} is not aligned to the {sector_kib} KiB sector size")]
    UnalignedErase { offset: u32, sector_kib: u32 },
}

impl CommandError {
    /// Errno-style exit status
    pub fn errno(&self) -> i32 {
        match self {
            Self::Aborted => qspiflash_core::Error::Cancelled.errno(),
            Self::File { .. } => qspiflash_core::Error::IoError.errno(),
            Self::UnalignedErase { .. } => {
                qspiflash_core::Error::InvalidArgument("unaligned erase").errno()
            }
        }
    }
}
