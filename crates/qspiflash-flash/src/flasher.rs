//! Flasher - one entry point over every flash controller kind
//!
//! The CLI never talks to a controller driver directly. It opens a
//! [`Flasher`] on a device, which picks the backend from the flash type
//! and rejects what no backend implements.

use std::io::{Read, Seek, Write};

use qspiflash_core::{
    CancelToken, Clock, Error, PcieDevice, Result, Topology, UpgradeProgress,
};
use qspiflash_qspips::{
    FlashDiagnostics, QspiPsConfig, QspiPsFlasher, UpgradeReport, UpgradeState,
};

use crate::flash_type::FlashType;

/// A seekable firmware image
pub trait Image: Read + Seek {}

impl<T: Read + Seek> Image for T {}

/// Options for opening a [`Flasher`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlasherOptions {
    /// Flash part string overriding the device's `flash_type` attribute,
    /// e.g. `qspi_ps_x2_single`
    pub flash_part: Option<String>,
    /// Settings for the QSPI-PS backend
    pub qspi: QspiPsConfig,
}

enum Backend<D, C> {
    QspiPs(QspiPsFlasher<D, C>),
    Unsupported,
}

/// Firmware flasher for one device
pub struct Flasher<D, C> {
    flash_type: FlashType,
    backend: Backend<D, C>,
}

impl<D: PcieDevice, C: Clock> Flasher<D, C> {
    /// Detect the flash type and set up the matching backend
    ///
    /// Opening never touches the hardware; an unimplemented flash type is
    /// only reported once an operation is attempted.
    pub fn open(dev: D, clock: C, options: FlasherOptions) -> Result<Self> {
        let (flash_type, backend) = match options.flash_part.as_deref() {
            Some(part) => {
                let flash_type: FlashType = part.parse()?;
                log::info!("Flash type {} (from --flash-part {})", flash_type, part);
                let backend = match flash_type {
                    FlashType::QspiPs => Backend::QspiPs(QspiPsFlasher::with_topology(
                        dev,
                        clock,
                        Topology::from_flash_type(part),
                        options.qspi,
                    )),
                    _ => Backend::Unsupported,
                };
                (flash_type, backend)
            }
            None => {
                let flash_type = FlashType::detect(&dev)?;
                log::info!("Flash type {}", flash_type);
                let backend = match flash_type {
                    FlashType::QspiPs => {
                        Backend::QspiPs(QspiPsFlasher::new(dev, clock, options.qspi))
                    }
                    _ => Backend::Unsupported,
                };
                (flash_type, backend)
            }
        };
        Ok(Self {
            flash_type,
            backend,
        })
    }

    /// The detected flash type
    pub fn flash_type(&self) -> FlashType {
        self.flash_type
    }

    /// Connection topology, for backends that have one
    pub fn topology(&self) -> Option<Topology> {
        match &self.backend {
            Backend::QspiPs(f) => Some(f.topology()),
            Backend::Unsupported => None,
        }
    }

    /// Where the last upgrade stopped, for backends that track it
    pub fn state(&self) -> Option<UpgradeState> {
        match &self.backend {
            Backend::QspiPs(f) => Some(f.state()),
            Backend::Unsupported => None,
        }
    }

    /// Make every poll loop of the backend observe `token`
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        if let Backend::QspiPs(f) = &mut self.backend {
            f.set_cancel_token(token);
        }
    }

    fn qspi(&mut self) -> Result<&mut QspiPsFlasher<D, C>> {
        match &mut self.backend {
            Backend::QspiPs(f) => Ok(f),
            Backend::Unsupported => {
                log::error!("Flash type {} is not supported", self.flash_type);
                Err(Error::Unsupported("flash type has no backend"))
            }
        }
    }

    /// Program `primary`, or revert to the golden image when `None`
    pub fn upgrade_firmware(
        &mut self,
        primary: Option<&mut dyn Image>,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<UpgradeReport> {
        let Some(mut image) = primary else {
            log::error!("Reverting to the golden image is not supported for {}", self.flash_type);
            return Err(Error::Unsupported("revert to golden image"));
        };
        self.qspi()?.upgrade_firmware(&mut image, progress)
    }

    /// Copy `len` bytes from flash `offset` into `out`
    pub fn dump(
        &mut self,
        offset: u32,
        len: u32,
        mut out: &mut dyn Write,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<()> {
        self.qspi()?.dump(offset, len, &mut out, progress)
    }

    /// Erase the sectors covering `[offset, offset + len)`
    pub fn erase(
        &mut self,
        offset: u32,
        len: u32,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<u32> {
        self.qspi()?.erase_range(offset, len, progress)
    }

    /// Bulk erase the whole flash
    pub fn erase_chip(&mut self, progress: &mut dyn UpgradeProgress) -> Result<()> {
        self.qspi()?.erase_chip(progress)
    }

    /// Identify the flash and read its status registers
    pub fn probe(&mut self) -> Result<FlashDiagnostics> {
        self.qspi()?.diagnose()
    }
}
