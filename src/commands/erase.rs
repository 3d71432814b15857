//! Erase command implementation

use qspiflash_core::opcodes::SECTOR_SIZE;

use super::progress::BarProgress;
use super::{confirm, CommandError, DeviceFlasher};

/// Erase the sectors covering `[offset, offset + length)`
pub fn run_erase(
    flasher: &mut DeviceFlasher,
    offset: u32,
    length: u32,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if offset % SECTOR_SIZE != 0 {
        return Err(CommandError::UnalignedErase {
            offset,
            sector_kib: SECTOR_SIZE / 1024,
        }
        .into());
    }

    confirm(
        &format!(
            "This erases 0x{:08X}..0x{:08X}.",
            offset,
            u64::from(offset) + u64::from(length)
        ),
        force,
    )?;

    let sectors = flasher.erase(offset, length, &mut BarProgress::new())?;
    println!(
        "Erased {} sector(s) starting at 0x{:08X}",
        sectors, offset
    );
    Ok(())
}

/// Bulk erase the whole flash
pub fn run_erase_chip(
    flasher: &mut DeviceFlasher,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    confirm("This erases the whole flash, firmware included.", force)?;
    flasher.erase_chip(&mut BarProgress::new())?;
    println!("Flash erased");
    Ok(())
}
