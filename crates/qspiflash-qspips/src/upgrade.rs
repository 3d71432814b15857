//! Firmware upgrade orchestration
//!
//! The upgrade walks a fixed sequence of states. Any failure stops the walk
//! where it happened; there is no automatic rollback. A verify mismatch is
//! the one exception: 4-byte mode is still left before the mismatch is
//! reported.

use std::io::{Read, Seek, SeekFrom};

use qspiflash_core::opcodes::{self, PAGE_SIZE};
use qspiflash_core::{Clock, Error, PcieDevice, Phase, Result, UpgradeProgress, WaitCondition};

use crate::flasher::QspiPsFlasher;
use crate::protocol::FlashId;

/// Step of the upgrade sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpgradeState {
    /// Controller select, reset and enable
    Init,
    /// Reading the flash identification
    IdProbe,
    /// Switching the flash to 4-byte addressing
    FourByteEnter,
    /// Erasing the image range
    Erase,
    /// Programming the image page by page
    Program,
    /// Reading back and comparing
    Verify,
    /// Switching the flash back to 3-byte addressing
    FourByteExit,
    /// Sequence completed
    Done,
    /// Sequence stopped on an error
    Failed,
}

/// Summary of a completed upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Image size in bytes
    pub image_size: usize,
    /// Identification read during the probe
    pub flash_id: FlashId,
    /// Erase commands issued
    pub sectors_erased: u32,
    /// Non-empty pages programmed
    pub pages_programmed: usize,
    /// Whether the read-back comparison ran
    pub verified: bool,
}

/// Page geometry of an image: full pages plus the size of the last one
fn page_layout(total: usize) -> (usize, usize) {
    (total / PAGE_SIZE, total % PAGE_SIZE)
}

fn io_error(what: &str, e: std::io::Error) -> Error {
    log::error!("Failed to {}: {}", what, e);
    Error::IoError
}

/// Size an image by seeking to its end, then rewind it
fn image_size<R: Seek>(image: &mut R) -> Result<usize> {
    let size = image
        .seek(SeekFrom::End(0))
        .map_err(|e| io_error("size the image", e))?;
    image
        .seek(SeekFrom::Start(0))
        .map_err(|e| io_error("rewind the image", e))?;
    if size > u64::from(u32::MAX) {
        return Err(Error::ImageTooLarge);
    }
    Ok(size as usize)
}

impl<D: PcieDevice, C: Clock> QspiPsFlasher<D, C> {
    /// Select GQSPI, check the device answers, reset and enable
    pub(crate) fn bring_up(&mut self) -> Result<()> {
        self.ctrl.init()?;
        self.ctrl.status()?;
        self.ctrl.reset()?;
        self.ctrl.enable()
    }

    /// Read the flash ID, treating "never ready" as "no flash"
    pub(crate) fn probe(&mut self) -> Result<FlashId> {
        match self.get_flash_id() {
            Ok(id) => {
                log::info!("Found flash: {}", id);
                Ok(id)
            }
            Err(Error::Timeout(WaitCondition::FlashReady)) | Err(Error::FlashNotDetected) => {
                log::error!("Could not get flash ID");
                Err(Error::FlashNotDetected)
            }
            Err(e) => Err(e),
        }
    }

    /// Write `image` to flash starting at address 0
    ///
    /// Runs init, ID probe, 4-byte mode entry, erase, program, verify (when
    /// enabled) and 4-byte mode exit. [`Self::state`] afterwards tells
    /// where a failed upgrade stopped.
    pub fn upgrade_firmware<R: Read + Seek>(
        &mut self,
        image: &mut R,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<UpgradeReport> {
        let total = image_size(image)?;
        log::info!("Image has {} bytes", total);

        self.clear_buffers();
        let mut state = UpgradeState::Init;
        let mut flash_id = None;
        let mut sectors_erased = 0;
        let mut pages_programmed = 0;
        let mut verify_failure = None;

        while state != UpgradeState::Done {
            self.state = state;
            let step = match state {
                UpgradeState::Init => self.bring_up().map(|_| UpgradeState::IdProbe),
                UpgradeState::IdProbe => self.probe().map(|id| {
                    flash_id = Some(id);
                    UpgradeState::FourByteEnter
                }),
                UpgradeState::FourByteEnter => self
                    .enter_or_exit_four_bytes_mode(true)
                    .map(|_| UpgradeState::Erase),
                UpgradeState::Erase => {
                    log::info!("Erasing flash");
                    self.erase_sector(0, total as u32, opcodes::BE_DC, progress)
                        .map(|n| {
                            sectors_erased = n;
                            UpgradeState::Program
                        })
                }
                UpgradeState::Program => {
                    log::info!("Programming flash");
                    self.program_image(image, total, progress).map(|n| {
                        pages_programmed = n;
                        if self.config.verify_after_program {
                            UpgradeState::Verify
                        } else {
                            UpgradeState::FourByteExit
                        }
                    })
                }
                UpgradeState::Verify => {
                    log::info!("Verifying");
                    match self.verify_image(image, total, progress) {
                        Err(e @ Error::VerifyError { .. }) => {
                            verify_failure = Some(e);
                            Ok(UpgradeState::FourByteExit)
                        }
                        other => other.map(|_| UpgradeState::FourByteExit),
                    }
                }
                UpgradeState::FourByteExit => self
                    .enter_or_exit_four_bytes_mode(false)
                    .map(|_| UpgradeState::Done),
                UpgradeState::Done | UpgradeState::Failed => break,
            };

            match step {
                Ok(next) => {
                    log::debug!("Upgrade {:?} -> {:?}", state, next);
                    state = next;
                }
                Err(e) => {
                    log::error!("Upgrade failed during {:?}: {}", state, e);
                    self.state = UpgradeState::Failed;
                    return Err(e);
                }
            }
        }

        self.clear_buffers();
        if let Some(e) = verify_failure {
            self.state = UpgradeState::Failed;
            return Err(e);
        }

        self.state = UpgradeState::Done;
        let flash_id = flash_id.ok_or(Error::FlashNotDetected)?;
        Ok(UpgradeReport {
            image_size: total,
            flash_id,
            sectors_erased,
            pages_programmed,
            verified: self.config.verify_after_program,
        })
    }

    /// Program pages `0..=pages`; the last page holds the remainder
    fn program_image<R: Read>(
        &mut self,
        image: &mut R,
        total: usize,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<usize> {
        let (pages, remain) = page_layout(total);
        let mut programmed = 0;

        progress.start(Phase::Program, total);
        for page in 0..=pages {
            let size = if page != pages { PAGE_SIZE } else { remain };
            if size == 0 {
                continue;
            }
            let addr = (page * PAGE_SIZE) as u32;
            image
                .read_exact(&mut self.write_buf[..size])
                .map_err(|e| io_error("read the image", e))?;
            self.write_from_buffer(addr, size, None)?;
            programmed += 1;
            progress.advance(page * PAGE_SIZE + size);
        }
        progress.finish(Phase::Program);
        Ok(programmed)
    }

    /// Re-read every page and compare against the image
    fn verify_image<R: Read + Seek>(
        &mut self,
        image: &mut R,
        total: usize,
        progress: &mut dyn UpgradeProgress,
    ) -> Result<()> {
        image
            .seek(SeekFrom::Start(0))
            .map_err(|e| io_error("rewind the image", e))?;
        let (pages, remain) = page_layout(total);
        let mut mismatched = 0u32;
        let mut first_page = None;

        progress.start(Phase::Verify, total);
        for page in 0..=pages {
            let size = if page != pages { PAGE_SIZE } else { remain };
            if size == 0 {
                continue;
            }
            let addr = (page * PAGE_SIZE) as u32;
            image
                .read_exact(&mut self.write_buf[..size])
                .map_err(|e| io_error("read the image", e))?;
            self.read_into_buffer(addr, size, None)?;
            if self.read_buf[..size] != self.write_buf[..size] {
                log::warn!("Found mismatch at page {}", page);
                mismatched += 1;
                first_page.get_or_insert(page as u32);
            }
            progress.advance(page * PAGE_SIZE + size);
        }
        progress.finish(Phase::Verify);

        match first_page {
            Some(first_page) => Err(Error::VerifyError {
                pages: mismatched,
                first_page,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QspiPsConfig;
    use qspiflash_core::{CancelToken, NoProgress};
    use qspiflash_dummy::{ChipConfig, DummyConfig, DummyController, ManualClock};
    use std::io::Cursor;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u32).wrapping_mul(2_654_435_761) as u8 ^ (i >> 8) as u8).collect()
    }

    fn upgrade(
        dev: &mut DummyController,
        data: &[u8],
        config: QspiPsConfig,
    ) -> (Result<UpgradeReport>, UpgradeState) {
        let mut f = QspiPsFlasher::new(dev, ManualClock::new(), config);
        let result = f.upgrade_firmware(&mut Cursor::new(data), &mut NoProgress);
        (result, f.state())
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<(Phase, usize)>,
        last: usize,
        finished: Vec<Phase>,
    }

    impl UpgradeProgress for Recorder {
        fn start(&mut self, phase: Phase, total: usize) {
            self.phases.push((phase, total));
            self.last = 0;
        }
        fn advance(&mut self, done: usize) {
            assert!(done >= self.last);
            self.last = done;
        }
        fn finish(&mut self, phase: Phase) {
            self.finished.push(phase);
        }
    }

    #[test]
    fn test_upgrade_round_trip() {
        let mut dev = DummyController::new(DummyConfig::default());
        let data = image(3 * PAGE_SIZE + 100);
        let (result, state) = upgrade(&mut dev, &data, QspiPsConfig::default());
        let report = result.unwrap();
        assert_eq!(state, UpgradeState::Done);
        assert_eq!(report.image_size, data.len());
        assert_eq!(report.pages_programmed, 4);
        assert_eq!(report.sectors_erased, 2);
        assert!(report.verified);
        assert_eq!(&dev.logical_contents()[..data.len()], &data[..]);
        // 4-byte mode was left on the way out
        assert!(!dev.four_byte_mode(0));
        assert!(!dev.four_byte_mode(1));
    }

    fn check_one_kib_upgrade(config: DummyConfig) -> DummyController {
        let mut dev = DummyController::new(config);
        let data = image(1024);
        let (result, state) = upgrade(&mut dev, &data, QspiPsConfig::default());
        let report = result.unwrap();
        assert_eq!(state, UpgradeState::Done);
        assert_eq!(report.sectors_erased, 1024 / opcodes::SECTOR_SIZE + 2);
        assert_eq!(report.pages_programmed, 4);
        assert!(report.verified);
        assert_eq!(&dev.logical_contents()[..1024], &data[..]);

        let lower = |op: u8| {
            dev.command_log()
                .iter()
                .filter(|c| c.opcode == op && c.chip == 0)
                .count()
        };
        assert_eq!(lower(opcodes::BE_DC), 2);
        assert_eq!(lower(opcodes::QPP), 4);
        assert_eq!(lower(opcodes::QOR), 4);
        dev
    }

    #[test]
    fn test_one_kib_image() {
        check_one_kib_upgrade(DummyConfig::default());
    }

    #[test]
    fn test_one_kib_image_on_x2_bus() {
        let dev = check_one_kib_upgrade(DummyConfig {
            flash_type: Some("qspi_ps_x2".into()),
            ..Default::default()
        });
        assert!(dev
            .command_log()
            .iter()
            .all(|c| c.opcode != opcodes::PP && c.opcode != opcodes::DOR));
    }

    #[test]
    fn test_page_aligned_image_skips_empty_last_page() {
        let mut dev = DummyController::new(DummyConfig::default());
        let data = image(2 * PAGE_SIZE);
        let (result, _) = upgrade(&mut dev, &data, QspiPsConfig::default());
        assert_eq!(result.unwrap().pages_programmed, 2);
        let programs = dev
            .command_log()
            .iter()
            .filter(|c| c.opcode == opcodes::QPP && c.chip == 0)
            .count();
        assert_eq!(programs, 2);
    }

    #[test]
    fn test_erase_covers_image_plus_two_sectors() {
        let mut dev = DummyController::new(DummyConfig::default());
        let data = image(0x1_8000);
        let (result, _) = upgrade(&mut dev, &data, QspiPsConfig::default());
        assert_eq!(result.unwrap().sectors_erased, 3);
    }

    #[test]
    fn test_single_chip_upgrade() {
        let config = DummyConfig {
            flash_type: Some("qspi_ps_x4_single".into()),
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let data = image(1000);
        let (result, _) = upgrade(&mut dev, &data, QspiPsConfig::default());
        result.unwrap();
        assert_eq!(&dev.chip_contents(0)[..1000], &data[..]);
        assert!(dev.command_log().iter().all(|c| c.chip == 0));
    }

    #[test]
    fn test_progress_phases() {
        let mut dev = DummyController::new(DummyConfig::default());
        let data = image(700);
        let mut recorder = Recorder::default();
        let mut f = QspiPsFlasher::new(&mut dev, ManualClock::new(), QspiPsConfig::default());
        f.upgrade_firmware(&mut Cursor::new(&data), &mut recorder)
            .unwrap();
        assert_eq!(
            recorder.phases,
            vec![(Phase::Erase, 2), (Phase::Program, 700), (Phase::Verify, 700)]
        );
        assert_eq!(recorder.finished, vec![Phase::Erase, Phase::Program, Phase::Verify]);
    }

    #[test]
    fn test_no_flash_stops_before_erase() {
        let chip = ChipConfig {
            jedec_id: [0x20, 0xBB, 0xFF],
            ..Default::default()
        };
        let config = DummyConfig {
            lower: chip.clone(),
            upper: chip,
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let (result, state) = upgrade(&mut dev, &image(512), QspiPsConfig::default());
        assert_eq!(result, Err(Error::FlashNotDetected));
        assert_eq!(state, UpgradeState::Failed);
        let destructive = [opcodes::BE_DC, opcodes::QPP, opcodes::CE_C7, opcodes::EN4B];
        assert!(dev
            .command_log()
            .iter()
            .all(|c| !destructive.contains(&c.opcode)));
    }

    #[test]
    fn test_buffers_cleared_before_upgrade() {
        let chip = ChipConfig {
            jedec_id: [0x20, 0xBB, 0xFF],
            ..Default::default()
        };
        let config = DummyConfig {
            lower: chip.clone(),
            upper: chip,
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let mut f = QspiPsFlasher::new(&mut dev, ManualClock::new(), QspiPsConfig::default());
        f.read_buf.fill(0x5A);
        f.write_buf.fill(0x5A);
        let result = f.upgrade_firmware(&mut Cursor::new(image(512)), &mut NoProgress);
        assert_eq!(result, Err(Error::FlashNotDetected));
        assert!(f.read_buf.iter().all(|&b| b == 0));
        assert!(f.write_buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_absent_flash_is_not_detected() {
        let chip = ChipConfig {
            present: false,
            ..Default::default()
        };
        let config = DummyConfig {
            lower: chip.clone(),
            upper: chip,
            ..Default::default()
        };
        let mut dev = DummyController::new(config);
        let (result, _) = upgrade(&mut dev, &image(16), QspiPsConfig::default());
        assert_eq!(result, Err(Error::FlashNotDetected));
    }

    #[test]
    fn test_unreachable_device() {
        let mut dev = DummyController::new(DummyConfig::default());
        dev.unplug();
        let (result, state) = upgrade(&mut dev, &image(16), QspiPsConfig::default());
        assert_eq!(result, Err(Error::DeviceUnreachable));
        assert_eq!(state, UpgradeState::Failed);
        assert!(dev.command_log().is_empty());
    }

    #[test]
    fn test_verify_mismatch_is_reported_after_exit() {
        let mut dev = DummyController::new(DummyConfig::default());
        // page 1 of the image lands on a worn cell that keeps bit 0 stuck low
        dev.stick_bits_low(0, 0x80 + 3, 0x01);
        let data = vec![0xFFu8; 600];
        let (result, state) = upgrade(&mut dev, &data, QspiPsConfig::default());
        assert_eq!(
            result,
            Err(Error::VerifyError {
                pages: 1,
                first_page: 1
            })
        );
        assert_eq!(state, UpgradeState::Failed);
        let last = dev.command_log().last().cloned().unwrap();
        assert_eq!(last.opcode, opcodes::RDSR);
        assert!(dev.command_log().iter().any(|c| c.opcode == opcodes::EX4B));
    }

    #[test]
    fn test_verify_can_be_skipped() {
        let mut dev = DummyController::new(DummyConfig::default());
        let config = QspiPsConfig {
            verify_after_program: false,
            ..Default::default()
        };
        let (result, _) = upgrade(&mut dev, &image(300), config);
        assert!(!result.unwrap().verified);
        assert!(!dev
            .command_log()
            .iter()
            .any(|c| c.opcode == opcodes::QOR));
    }

    #[test]
    fn test_cancelled_upgrade() {
        let mut dev = DummyController::new(DummyConfig::default());
        let token = CancelToken::new();
        token.cancel();
        let mut f = QspiPsFlasher::new(&mut dev, ManualClock::new(), QspiPsConfig::default());
        f.set_cancel_token(token);
        let result = f.upgrade_firmware(&mut Cursor::new(image(64)), &mut NoProgress);
        assert_eq!(result, Err(Error::Cancelled));
        assert_eq!(f.state(), UpgradeState::Failed);
    }

    #[test]
    fn test_image_too_large() {
        struct Huge;
        impl Read for Huge {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Ok(0)
            }
        }
        impl Seek for Huge {
            fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
                Ok(match pos {
                    SeekFrom::End(_) => 1 << 33,
                    _ => 0,
                })
            }
        }
        let mut dev = DummyController::new(DummyConfig::default());
        let mut f = QspiPsFlasher::new(&mut dev, ManualClock::new(), QspiPsConfig::default());
        assert_eq!(
            f.upgrade_firmware(&mut Huge, &mut NoProgress),
            Err(Error::ImageTooLarge)
        );
    }
}
