//! CLI command implementations
//!
//! Every command opens the device through [`open_flasher`], which maps the
//! BAR, detects the flash type and hands back a [`Flasher`]. Destructive
//! commands ask before touching the flash unless `--force` is given.

mod dump;
mod error;
mod erase;
mod interrupt;
mod probe;
mod program;
mod progress;
mod revert;

pub use dump::run_dump;
pub use error::CommandError;
pub use erase::{run_erase, run_erase_chip};
pub use probe::run_probe;
pub use program::run_program;
pub use revert::run_revert;

use std::io::{self, BufRead, Write};

use qspiflash_core::clock::StdClock;
use qspiflash_flash::{Flasher, FlasherOptions, QspiPsConfig};
use qspiflash_pcie::{PciAddress, SysfsDevice};

use crate::cli::DeviceArgs;

/// Flasher over a real PCIe device
pub type DeviceFlasher = Flasher<SysfsDevice, StdClock>;

/// Map the device's BAR and open a flasher on it
pub fn open_flasher(
    args: &DeviceArgs,
    verify: bool,
    verbose: bool,
) -> Result<DeviceFlasher, Box<dyn std::error::Error>> {
    let address: PciAddress = args.device.parse()?;
    let dev = SysfsDevice::open(address, args.bar, args.bar_offset)?;

    let options = FlasherOptions {
        flash_part: args.flash_part.clone(),
        qspi: QspiPsConfig {
            flash_base: args.flash_base,
            verify_after_program: verify,
            verbose,
            ..Default::default()
        },
    };
    let mut flasher = Flasher::open(dev, StdClock::new(), options)?;
    flasher.set_cancel_token(interrupt::interrupt_token());
    Ok(flasher)
}

/// Ask the user to confirm `action`; `force` answers yes
pub fn confirm(action: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if force {
        return Ok(());
    }
    print!("{} Continue? [y/N] ", action);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    if is_yes(&answer) {
        Ok(())
    } else {
        Err(CommandError::Aborted.into())
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
    }

    #[test]
    fn test_force_skips_prompt() {
        assert!(confirm("Erase everything.", true).is_ok());
    }
}
