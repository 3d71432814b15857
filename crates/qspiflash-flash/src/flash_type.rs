//! Flash type names

use core::fmt;
use core::str::FromStr;

use qspiflash_core::{Error, PcieDevice};

/// Kind of flash controller a card carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FlashType {
    /// AXI quad SPI soft controller
    #[default]
    Spi,
    /// GQSPI controller of the processing system
    QspiPs,
    /// Octal SPI controller on Versal
    OspiVersal,
}

impl FlashType {
    /// Canonical name, as found in the `flash_type` attribute
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Spi => "spi",
            Self::QspiPs => "qspi_ps",
            Self::OspiVersal => "ospi_versal",
        }
    }

    /// All known flash types
    pub const fn all() -> &'static [FlashType] {
        &[Self::Spi, Self::QspiPs, Self::OspiVersal]
    }

    /// Read the flash type from the device's `flash_type` attribute
    ///
    /// A missing or empty attribute means [`FlashType::Spi`].
    pub fn detect<D: PcieDevice + ?Sized>(dev: &D) -> Result<Self, Error> {
        let value = dev
            .attribute("flash", "flash_type")
            .or_else(|| dev.attribute("", "flash_type"))
            .unwrap_or_default();
        log::debug!("flash_type attribute: '{}'", value.trim());
        value.parse()
    }
}

impl FromStr for FlashType {
    type Err = Error;

    /// Match on the prefix, so `qspi_ps_x4_single` is [`FlashType::QspiPs`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        // longest names first, "spi" is a prefix of nothing else
        [Self::OspiVersal, Self::QspiPs, Self::Spi]
            .into_iter()
            .find(|t| s.starts_with(t.name()))
            .ok_or(Error::InvalidArgument("unknown flash type"))
    }
}

impl fmt::Display for FlashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
