//! Revert command implementation

use qspiflash_core::NoProgress;

use super::{confirm, DeviceFlasher};

/// Switch the card back to its golden image
pub fn run_revert(flasher: &mut DeviceFlasher, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    confirm("This reverts the card to its golden image.", force)?;
    flasher.upgrade_firmware(None, &mut NoProgress)?;
    println!("Reverted to golden image");
    Ok(())
}
