//! Flash connection topology
//!
//! Cards wire either one flash chip or two chips in parallel ("dual
//! parallel") behind the controller. In dual parallel mode each chip stores
//! alternating bytes of the logical image, so every address sent on the wire
//! is half the logical address.

/// How the flash chips are wired to the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectMode {
    /// Two chips on lower and upper bus, data striped byte by byte
    #[default]
    DualParallel,
    /// One chip on the lower bus
    Single,
}

/// Number of data lines used for the data phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BusWidth {
    /// Standard SPI
    X1,
    /// Dual SPI
    X2,
    /// Quad SPI
    #[default]
    X4,
}

impl BusWidth {
    /// Number of data lines
    pub const fn lines(&self) -> u8 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }
}

/// Connection topology, fixed for the lifetime of a flasher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Topology {
    /// Single or dual parallel chips
    pub connect: ConnectMode,
    /// Data bus width
    pub bus_width: BusWidth,
}

impl Topology {
    /// Derive the topology from a `flash_type` attribute value
    ///
    /// Anything not mentioning `single` is dual parallel, anything not
    /// mentioning `x2` is quad wide. An empty string yields the default.
    ///
    /// ```
    /// use qspiflash_core::{BusWidth, ConnectMode, Topology};
    ///
    /// let t = Topology::from_flash_type("qspi_ps_x2_single");
    /// assert_eq!(t.connect, ConnectMode::Single);
    /// assert_eq!(t.bus_width, BusWidth::X2);
    /// ```
    pub fn from_flash_type(flash_type: &str) -> Self {
        let connect = if flash_type.contains("single") {
            ConnectMode::Single
        } else {
            ConnectMode::DualParallel
        };
        let bus_width = if flash_type.contains("x2") {
            BusWidth::X2
        } else {
            BusWidth::X4
        };
        log::debug!(
            "flash_type '{}': {:?}, {:?}",
            flash_type,
            connect,
            bus_width
        );
        Self { connect, bus_width }
    }

    /// Whether two chips are striped in parallel
    pub const fn is_dual(&self) -> bool {
        matches!(self.connect, ConnectMode::DualParallel)
    }

    /// Address sent on the wire for logical address `addr`
    pub const fn wire_address(&self, addr: u32) -> u32 {
        match self.connect {
            ConnectMode::DualParallel => addr / 2,
            ConnectMode::Single => addr,
        }
    }
}
