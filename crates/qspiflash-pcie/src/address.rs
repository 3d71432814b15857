//! PCI device addresses

use core::fmt;
use core::str::FromStr;

use crate::error::PcieError;

/// Domain, bus, device and function of a PCI function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    /// PCI domain (segment)
    pub domain: u16,
    /// Bus number
    pub bus: u8,
    /// Device number (0..32)
    pub device: u8,
    /// Function number (0..8)
    pub function: u8,
}

impl FromStr for PciAddress {
    type Err = PcieError;

    /// Parse `DDDD:BB:DD.F` or `BB:DD.F` (domain 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PcieError::InvalidAddress(s.to_string());

        let (rest, function) = s.trim().rsplit_once('.').ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split(':').collect();
        let (domain, bus, device) = match parts.as_slice() {
            [bus, device] => ("0", *bus, *device),
            [domain, bus, device] => (*domain, *bus, *device),
            _ => return Err(invalid()),
        };

        let domain = u16::from_str_radix(domain, 16).map_err(|_| invalid())?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| invalid())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| invalid())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| invalid())?;
        if device >= 32 || function >= 8 {
            return Err(invalid());
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}
