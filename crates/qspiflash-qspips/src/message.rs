//! Transfer messages
//!
//! A bus transaction is a list of messages executed under one chip-select
//! assertion. Each message is a single phase: bytes out, bytes in, or
//! dummy clocks.

use qspiflash_core::BusWidth;

/// Payload of one message
#[derive(Debug)]
pub enum Payload<'a> {
    /// Bytes to transmit
    Tx(&'a [u8]),
    /// Buffer to fill with received bytes
    Rx(&'a mut [u8]),
    /// Number of dummy clock cycles
    Dummy(u32),
}

/// One phase of a bus transaction
#[derive(Debug)]
pub struct Message<'a> {
    pub(crate) payload: Payload<'a>,
    pub(crate) bus_width: BusWidth,
    pub(crate) stripe: bool,
    /// Bytes already moved through the FIFO
    pub(crate) pos: usize,
}

impl<'a> Message<'a> {
    fn new(payload: Payload<'a>) -> Self {
        Self {
            payload,
            bus_width: BusWidth::X1,
            stripe: false,
            pos: 0,
        }
    }

    /// Transmit `data` on one line, unstriped
    pub fn tx(data: &'a [u8]) -> Self {
        Self::new(Payload::Tx(data))
    }

    /// Receive into `buf` on one line, unstriped
    pub fn rx(buf: &'a mut [u8]) -> Self {
        Self::new(Payload::Rx(buf))
    }

    /// Clock `cycles` dummy cycles
    pub fn dummy(cycles: u32) -> Self {
        Self::new(Payload::Dummy(cycles))
    }

    /// Use `width` data lines for this phase
    pub fn with_bus_width(mut self, width: BusWidth) -> Self {
        self.bus_width = width;
        self
    }

    /// Stripe data across both chips (ignored by single-chip topologies)
    pub fn striped(mut self) -> Self {
        self.stripe = true;
        self
    }

    /// Length of the phase in bytes (clock cycles for dummy phases)
    pub fn byte_count(&self) -> usize {
        match &self.payload {
            Payload::Tx(data) => data.len(),
            Payload::Rx(buf) => buf.len(),
            Payload::Dummy(cycles) => *cycles as usize,
        }
    }

    /// Whether this phase transmits
    pub fn is_tx(&self) -> bool {
        matches!(self.payload, Payload::Tx(_))
    }

    /// Whether this phase receives
    pub fn is_rx(&self) -> bool {
        matches!(self.payload, Payload::Rx(_))
    }
}
