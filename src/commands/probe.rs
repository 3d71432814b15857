//! Probe command implementation

use super::DeviceFlasher;

/// Identify the flash and print its registers
pub fn run_probe(flasher: &mut DeviceFlasher) -> Result<(), Box<dyn std::error::Error>> {
    let diag = flasher.probe()?;

    println!("Flash Information");
    println!("=================");
    println!();
    println!("Flash type:      {}", flasher.flash_type());
    if let Some(topology) = flasher.topology() {
        println!(
            "Topology:        {:?}, {} data lines",
            topology.connect,
            topology.bus_width.lines()
        );
    }
    println!("ID:              {}", diag.id);
    println!("Capacity code:   0x{:02X}", diag.id.capacity);
    if diag.id.chips_mismatch {
        println!("Warning:         the two chips report different IDs");
    }
    println!("Status:          {:02X?}", diag.status);
    println!("Flag status:     {:02X?}", diag.flag_status);
    println!("Extended addr:   {:02X?}", diag.extended_address);
    Ok(())
}
