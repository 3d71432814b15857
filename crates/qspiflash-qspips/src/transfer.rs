//! Polled transfer engine
//!
//! [`Gqspi::final_transfer`] runs a list of messages between one chip
//! select assertion and deassertion. TX data is pushed in chunks of
//! [`TXD_DEPTH`] bytes and topped up whenever the FIFO drops below its
//! threshold; RX data is drained a threshold's worth at a time, or all at
//! once when the generic FIFO has finished.

use qspiflash_core::{Clock, PcieDevice, Result};

use crate::controller::Gqspi;
use crate::genfifo;
use crate::message::{Message, Payload};
use crate::regs::genfifo::{DATA_XFER, RX, TX};
use crate::regs::{offset, Config, Isr, TXD_DEPTH};

impl<D: PcieDevice, C: Clock> Gqspi<D, C> {
    /// Queue the chip select assertion entry
    pub fn send_cs_assert(&mut self) -> Result<()> {
        self.regs
            .write(offset::GEN_FIFO, genfifo::cs_assert(self.topology))
    }

    /// Queue the chip select deassertion entry
    pub fn send_cs_deassert(&mut self) -> Result<()> {
        self.regs
            .write(offset::GEN_FIFO, genfifo::cs_deassert(self.topology))
    }

    /// Queue the data entries for `msg`, priming the TX FIFO first
    pub fn send_data(&mut self, msg: &mut Message<'_>) -> Result<()> {
        let mut entry = genfifo::data_base(self.topology, msg.bus_width.lines(), msg.stripe);

        let cfg = self.config()?;
        self.set_config(cfg - Config::MODE_EN)?;

        self.setup_tx_rx(msg, &mut entry)?;

        let count = msg.byte_count() as u32;
        for word in genfifo::data_entries(entry, count) {
            log::trace!("GenFIFO data 0x{:05X}", word);
            self.regs.write(offset::GEN_FIFO, word)?;
        }
        Ok(())
    }

    /// Set direction bits in `entry` and reset the byte counters for `msg`
    fn setup_tx_rx(&mut self, msg: &mut Message<'_>, entry: &mut u32) -> Result<()> {
        let (direction, tx_bytes, rx_bytes) = match &msg.payload {
            Payload::Tx(data) => (TX, data.len(), 0),
            Payload::Rx(buf) => (RX, 0, buf.len()),
            Payload::Dummy(_) => (0, 0, 0),
        };
        *entry = (*entry & !(TX | RX)) | DATA_XFER | direction;
        self.tx_bytes = tx_bytes;
        self.rx_bytes = rx_bytes;

        if msg.is_tx() {
            self.fill_tx_fifo(msg, TXD_DEPTH)?;
        }
        Ok(())
    }

    /// Push up to `max` bytes of `msg` into the TX FIFO
    ///
    /// Bytes are packed little-endian, four per word; a short final word is
    /// zero padded.
    pub(crate) fn fill_tx_fifo(&mut self, msg: &mut Message<'_>, max: usize) -> Result<()> {
        let data = match msg.payload {
            Payload::Tx(data) => data,
            _ => return Ok(()),
        };

        let mut count = 0;
        while self.tx_bytes > 0 && count < max {
            let n = self.tx_bytes.min(4);
            let mut word = [0u8; 4];
            word[..n].copy_from_slice(&data[msg.pos..msg.pos + n]);
            self.regs.write(offset::TXD, u32::from_le_bytes(word))?;
            msg.pos += n;
            count += n;
            self.tx_bytes -= n;
        }
        log::trace!("Filled TX FIFO with {} bytes", count);
        Ok(())
    }

    /// Pop up to `max` bytes from the RX FIFO into `msg`
    pub(crate) fn read_rx_fifo(&mut self, msg: &mut Message<'_>, max: usize) -> Result<()> {
        let Message { payload, pos, .. } = msg;
        let buf = match payload {
            Payload::Rx(buf) => buf,
            _ => return Ok(()),
        };

        let mut count = 0;
        while self.rx_bytes != 0 && count < max {
            let word = self.regs.read(offset::RXD)?.to_le_bytes();
            let n = self.rx_bytes.min(4);
            buf[*pos..*pos + n].copy_from_slice(&word[..n]);
            *pos += n;
            count += n;
            self.rx_bytes -= n;
        }
        Ok(())
    }

    /// Execute `msgs` as one bus transaction
    ///
    /// The controller is enabled, chip select asserted, each message sent
    /// and serviced until its bytes are fully moved, then chip select is
    /// deasserted and the controller disabled. A wait timeout aborts the
    /// transaction with chip select possibly still asserted; the caller is
    /// expected to re-run controller reset before retrying.
    pub fn final_transfer(&mut self, msgs: &mut [Message<'_>]) -> Result<()> {
        self.enable()?;
        self.send_cs_assert()?;

        for msg in msgs.iter_mut() {
            self.send_data(msg)?;

            loop {
                self.check_cancel()?;
                let status = self.status()?;

                if status.contains(Isr::TX_NOT_FULL) && msg.is_tx() && self.tx_bytes > 0 {
                    self.fill_tx_fifo(msg, TXD_DEPTH)?;
                }

                if msg.is_rx() {
                    let rx_thresh = self.regs.read(offset::RX_THRESH)? as usize;
                    if status.contains(Isr::RX_NOT_EMPTY) {
                        self.read_rx_fifo(msg, rx_thresh * 4)?;
                    } else if status.contains(Isr::GEN_FIFO_EMPTY) {
                        let all = msg.byte_count();
                        self.read_rx_fifo(msg, all)?;
                    }
                }

                self.wait_gen_fifo_empty()?;
                self.wait_tx_empty()?;

                if self.tx_bytes == 0 && self.rx_bytes == 0 {
                    break;
                }
            }
        }

        self.send_cs_deassert()?;
        self.wait_gen_fifo_empty()?;
        self.disable()
    }
}
