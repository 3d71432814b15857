//! Dump command implementation

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::progress::BarProgress;
use super::{CommandError, DeviceFlasher};

/// Read `length` bytes from `offset` into `output`
pub fn run_dump(
    flasher: &mut DeviceFlasher,
    output: &Path,
    offset: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(output).map_err(|source| CommandError::File {
        path: output.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    flasher.dump(offset, length, &mut out, &mut BarProgress::new())?;
    out.flush()?;

    println!(
        "Read {} bytes from 0x{:08X} into {}",
        length,
        offset,
        output.display()
    );
    Ok(())
}
