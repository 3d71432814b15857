//! Program command implementation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::progress::BarProgress;
use super::{confirm, CommandError, DeviceFlasher};

/// Write `image` into the flash and report the result
pub fn run_program(
    flasher: &mut DeviceFlasher,
    image: &Path,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(image).map_err(|source| CommandError::File {
        path: image.to_path_buf(),
        source,
    })?;
    let size = file.metadata()?.len();

    println!(
        "Programming {} ({} bytes) into {} flash",
        image.display(),
        size,
        flasher.flash_type()
    );
    confirm("This overwrites the card's firmware.", force)?;

    let mut reader = BufReader::new(file);
    let report = flasher.upgrade_firmware(Some(&mut reader), &mut BarProgress::new())?;

    println!("Flash: {}", report.flash_id);
    println!(
        "Erased {} sector(s), programmed {} page(s)",
        report.sectors_erased, report.pages_programmed
    );
    if report.verified {
        println!("Verified OK");
    } else {
        println!("Verification skipped");
    }
    println!("Cold reboot the host to load the new firmware");
    Ok(())
}
