//! QSPI-PS flasher handle and configuration

use std::time::Duration;

use qspiflash_core::{CancelToken, Clock, PcieDevice, Topology};

use crate::controller::{Gqspi, DEFAULT_TIMEOUT};
use crate::upgrade::UpgradeState;

/// Size of the read and write staging buffers
pub const BUFFER_SIZE: usize = 8192;

/// Offset of the flash controller window inside the management BAR
pub const DEFAULT_FLASH_BASE: u64 = 0x04_0000;

/// Flasher configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QspiPsConfig {
    /// Offset of the controller registers inside the BAR
    pub flash_base: u64,
    /// Read back and compare the image after programming
    pub verify_after_program: bool,
    /// Log per-operation details at info level instead of debug
    pub verbose: bool,
    /// Budget for each wait on the controller FIFOs
    pub fifo_timeout: Duration,
    /// Budget for each wait on the flash busy bit
    pub ready_timeout: Duration,
}

impl Default for QspiPsConfig {
    fn default() -> Self {
        Self {
            flash_base: DEFAULT_FLASH_BASE,
            verify_after_program: true,
            verbose: false,
            fifo_timeout: DEFAULT_TIMEOUT,
            ready_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Flasher for the QSPI flash behind a GQSPI controller
///
/// Owns the controller handle and two staging buffers. Only one flash
/// operation may be in flight per instance.
pub struct QspiPsFlasher<D, C> {
    pub(crate) ctrl: Gqspi<D, C>,
    pub(crate) config: QspiPsConfig,
    pub(crate) read_buf: Box<[u8]>,
    pub(crate) write_buf: Box<[u8]>,
    pub(crate) state: UpgradeState,
}

impl<D: PcieDevice, C: Clock> QspiPsFlasher<D, C> {
    /// Create a flasher, taking the topology from the `flash_type` attribute
    ///
    /// The attribute is looked up in the `flash` sub-device first, then on
    /// the device itself. A missing attribute yields dual parallel x4.
    pub fn new(dev: D, clock: C, config: QspiPsConfig) -> Self {
        let flash_type = dev
            .attribute("flash", "flash_type")
            .or_else(|| dev.attribute("", "flash_type"))
            .unwrap_or_default();
        let topology = Topology::from_flash_type(flash_type.trim());
        Self::with_topology(dev, clock, topology, config)
    }

    /// Create a flasher with an explicit topology
    pub fn with_topology(dev: D, clock: C, topology: Topology, config: QspiPsConfig) -> Self {
        let mut ctrl = Gqspi::new(dev, config.flash_base, clock, topology);
        ctrl.fifo_timeout = config.fifo_timeout;
        Self {
            ctrl,
            config,
            read_buf: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            write_buf: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            state: UpgradeState::Init,
        }
    }

    /// Connection topology
    pub fn topology(&self) -> Topology {
        self.ctrl.topology()
    }

    /// Active configuration
    pub fn config(&self) -> &QspiPsConfig {
        &self.config
    }

    /// Upgrade state reached by the last (or current) upgrade
    pub fn state(&self) -> UpgradeState {
        self.state
    }

    /// Abort polling with `Error::Cancelled` once `token` fires
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.ctrl.set_cancel_token(token);
    }

    pub(crate) fn level(&self) -> log::Level {
        if self.config.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    /// Zero both staging buffers
    pub(crate) fn clear_buffers(&mut self) {
        self.read_buf.fill(0);
        self.write_buf.fill(0);
    }
}
