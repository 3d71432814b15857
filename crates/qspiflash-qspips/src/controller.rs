//! GQSPI controller lifecycle and status polling
//!
//! The controller is driven entirely in polled IO mode. This module owns
//! bring-up (select, reset, abort), enable/disable and the bounded waits
//! on interrupt status bits. The transfer engine lives in
//! [`crate::transfer`].

use std::time::Duration;

use qspiflash_core::{
    CancelToken, Clock, Deadline, Error, PcieDevice, Result, Topology, WaitCondition,
};

use crate::registers::Registers;
use crate::regs::{self, fifo_ctrl, offset, thresh, Config, Isr};

/// Interval between status polls while waiting on the FIFOs
pub const FIFO_POLL_INTERVAL: Duration = Duration::from_micros(5);

/// Interval between flash status register reads while waiting for ready
pub const READY_POLL_INTERVAL: Duration = Duration::from_micros(20);

/// Default budget for every bounded wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GQSPI controller state
///
/// `tx_bytes` and `rx_bytes` are the bytes still owed to and by the FIFOs
/// for the message currently in flight.
pub struct Gqspi<D, C> {
    pub(crate) regs: Registers<D>,
    pub(crate) clock: C,
    pub(crate) topology: Topology,
    pub(crate) fifo_timeout: Duration,
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) tx_bytes: usize,
    pub(crate) rx_bytes: usize,
}

impl<D: PcieDevice, C: Clock> Gqspi<D, C> {
    /// Create a controller handle over `dev` with registers at `flash_base`
    pub fn new(dev: D, flash_base: u64, clock: C, topology: Topology) -> Self {
        Self {
            regs: Registers::new(dev, flash_base),
            clock,
            topology,
            fifo_timeout: DEFAULT_TIMEOUT,
            cancel: None,
            tx_bytes: 0,
            rx_bytes: 0,
        }
    }

    /// Connection topology
    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Clock used for polling
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Stop polling with [`Error::Cancelled`] once `token` fires
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    pub(crate) fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    /// Read the interrupt status register
    ///
    /// An all-ones value means the BAR is not decoding (device gone or
    /// link down) and is reported as [`Error::DeviceUnreachable`].
    pub fn status(&mut self) -> Result<Isr> {
        let raw = self.regs.read(offset::ISR)?;
        if raw == u32::MAX {
            log::error!("QSPI status register reads 0xFFFFFFFF, device unreachable");
            return Err(Error::DeviceUnreachable);
        }
        Ok(Isr::from_bits_retain(raw))
    }

    /// Read the configuration register
    pub fn config(&mut self) -> Result<Config> {
        Ok(Config::from_bits_retain(self.regs.read(offset::CFG)?))
    }

    /// Write the configuration register
    pub fn set_config(&mut self, cfg: Config) -> Result<()> {
        self.regs.write(offset::CFG, cfg.bits())
    }

    /// Enable the controller
    pub fn enable(&mut self) -> Result<()> {
        self.regs.write(offset::EN, regs::ENABLE)
    }

    /// Disable the controller
    pub fn disable(&mut self) -> Result<()> {
        self.regs.write(offset::EN, 0)
    }

    /// Whether the window is routed to the generic-FIFO controller
    pub fn is_gqspi_mode(&mut self) -> Result<bool> {
        Ok(self.regs.read(offset::SEL)? != 0)
    }

    /// Select GQSPI mode if needed and leave the controller disabled
    pub fn init(&mut self) -> Result<()> {
        if !self.is_gqspi_mode()? {
            log::info!("Legacy LQSPI mode is not supported, switching to GQSPI");
            self.regs.write(offset::SEL, regs::SEL_GQSPI)?;
        }
        self.disable()?;
        log::debug!("GQSPI initialized");
        Ok(())
    }

    /// Clear and mask interrupts, flush the FIFOs and disable
    pub fn abort(&mut self) -> Result<()> {
        let status = self.status()?;
        let cfg = self.config()?;

        self.regs.write(offset::ISR, (status | Isr::WR_TO_CLR).bits())?;
        self.regs.write(offset::IDR, regs::IDR_ALL)?;

        if self.status()?.contains(Isr::RX_EMPTY) {
            let flush = fifo_ctrl::RST_TX_FIFO | fifo_ctrl::RST_GEN_FIFO;
            self.regs.write(offset::FIFO_CTRL, flush)?;
        }

        if status.contains(Isr::RX_EMPTY) {
            // RX FIFO can only be flushed in IO mode
            self.set_config(cfg - Config::MODE_EN)?;
            self.regs.write(offset::FIFO_CTRL, fifo_ctrl::RST_RX_FIFO)?;
        }

        self.disable()?;
        log::debug!("GQSPI abort done");
        Ok(())
    }

    /// Abort, then program IO mode, auto start, little endian, WP/HOLD,
    /// divide-by-8 clock, SPI mode 0 and reset-value thresholds
    pub fn reset(&mut self) -> Result<()> {
        self.abort()?;

        let mut cfg = self.config()?;
        cfg.remove(
            Config::MODE_EN | Config::GEN_FIFO_START_MODE | Config::ENDIAN | Config::EN_POLL_TO,
        );
        cfg.insert(Config::WP_HOLD);
        cfg.remove(Config::BAUD_RATE_DIV);
        cfg |= Config::from_bits_retain(regs::BAUD_RATE_DIV_8);
        cfg.remove(Config::CLK_PHA | Config::CLK_POL);
        self.set_config(cfg)?;

        self.regs.write(offset::TX_THRESH, thresh::TX_RESET)?;
        self.regs.write(offset::RX_THRESH, thresh::RX_RESET)?;
        self.regs.write(offset::GF_THRESH, thresh::GF_RESET)?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "GQSPI reset: CFG=0x{:08X} TX_THRESH=0x{:X} RX_THRESH=0x{:X} GF_THRESH=0x{:X}",
                cfg.bits(),
                self.regs.read(offset::TX_THRESH)?,
                self.regs.read(offset::RX_THRESH)?,
                self.regs.read(offset::GF_THRESH)?
            );
        }
        Ok(())
    }

    /// Poll ISR until every bit of `bits` is set or the FIFO budget runs out
    fn wait_status(&mut self, bits: Isr, cond: WaitCondition) -> Result<()> {
        let deadline = Deadline::after(&self.clock, self.fifo_timeout);
        loop {
            self.check_cancel()?;
            let status = self.status()?;
            if status.contains(bits) {
                return Ok(());
            }
            if deadline.expired(&self.clock) {
                log::error!("Timed out waiting for {} (ISR=0x{:08X})", cond, status.bits());
                return Err(Error::Timeout(cond));
            }
            self.clock.sleep(FIFO_POLL_INTERVAL);
        }
    }

    /// Wait until the generic FIFO is empty
    pub fn wait_gen_fifo_empty(&mut self) -> Result<()> {
        self.wait_status(Isr::GEN_FIFO_EMPTY, WaitCondition::GenFifoEmpty)
    }

    /// Wait until the TX data FIFO is empty
    pub fn wait_tx_empty(&mut self) -> Result<()> {
        self.wait_status(Isr::TX_EMPTY, WaitCondition::TxEmpty)
    }
}
