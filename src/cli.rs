//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u64
fn parse_hex_u64(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "qspiflash")]
#[command(author, version, about = "In-band QSPI flash programmer for PCIe cards", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// PCI address of the management function ([DDDD:]BB:DD.F)
    #[arg(short, long)]
    pub device: String,

    /// BAR holding the flash controller window
    #[arg(long, default_value_t = 0)]
    pub bar: u8,

    /// Offset added to every BAR access (hex or decimal)
    #[arg(long, default_value = "0", value_parser = parse_hex_u64)]
    pub bar_offset: u64,

    /// Offset of the flash controller registers inside the BAR
    #[arg(long, default_value = "0x40000", value_parser = parse_hex_u64)]
    pub flash_base: u64,

    /// Flash part overriding the driver's flash_type (e.g. qspi_ps_x2_single)
    #[arg(long)]
    pub flash_part: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Program a firmware image into the flash
    Program {
        #[command(flatten)]
        device: DeviceArgs,

        /// Firmware image (raw binary, written from address 0)
        #[arg(short, long)]
        image: PathBuf,

        /// Skip read-back verification
        #[arg(long)]
        no_verify: bool,

        /// Don't ask for confirmation
        #[arg(long)]
        force: bool,
    },

    /// Revert the card to its golden image
    Revert {
        #[command(flatten)]
        device: DeviceArgs,

        /// Don't ask for confirmation
        #[arg(long)]
        force: bool,
    },

    /// Read flash contents to a file
    Dump {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        offset: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Erase a range of flash sectors
    Erase {
        #[command(flatten)]
        device: DeviceArgs,

        /// Start address, sector aligned (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        offset: u32,

        /// Number of bytes to erase, rounded up to whole sectors
        #[arg(short, long, value_parser = parse_hex_u32, required_unless_present = "all")]
        length: Option<u32>,

        /// Erase the whole flash with a bulk erase
        #[arg(long, conflicts_with_all = ["offset", "length"])]
        all: bool,

        /// Don't ask for confirmation
        #[arg(long)]
        force: bool,
    },

    /// Identify the flash and show its status registers
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },
}
