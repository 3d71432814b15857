//! qspiflash - In-band QSPI flash programmer for PCIe accelerator cards
//!
//! Programs the boot flash behind a card's GQSPI controller through the
//! controller registers exposed in a PCIe BAR, without JTAG or a cable.
//!
//! # Architecture
//!
//! The CLI only talks to `qspiflash-flash`, which detects the flash type
//! from the card's `flash_type` attribute and dispatches to the matching
//! controller driver. `qspiflash-pcie` provides the BAR mapping.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(e.as_ref()));
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Program {
            device,
            image,
            no_verify,
            force,
        } => {
            let mut flasher = commands::open_flasher(&device, !no_verify, verbose)?;
            commands::run_program(&mut flasher, &image, force)
        }
        Commands::Revert { device, force } => {
            let mut flasher = commands::open_flasher(&device, true, verbose)?;
            commands::run_revert(&mut flasher, force)
        }
        Commands::Dump {
            device,
            output,
            offset,
            length,
        } => {
            let mut flasher = commands::open_flasher(&device, true, verbose)?;
            commands::run_dump(&mut flasher, &output, offset, length)
        }
        Commands::Erase {
            device,
            offset,
            length,
            all,
            force,
        } => {
            let mut flasher = commands::open_flasher(&device, true, verbose)?;
            match length {
                Some(length) if !all => commands::run_erase(&mut flasher, offset, length, force),
                _ => commands::run_erase_chip(&mut flasher, force),
            }
        }
        Commands::Probe { device } => {
            let mut flasher = commands::open_flasher(&device, true, verbose)?;
            commands::run_probe(&mut flasher)
        }
    }
}

/// Errno-style exit status for `e`; 1 for errors without one
fn exit_code(e: &(dyn std::error::Error + 'static)) -> i32 {
    if let Some(e) = e.downcast_ref::<qspiflash_core::Error>() {
        return e.errno();
    }
    if let Some(e) = e.downcast_ref::<qspiflash_pcie::PcieError>() {
        return e.as_core().errno();
    }
    if let Some(e) = e.downcast_ref::<commands::CommandError>() {
        return e.errno();
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspiflash_core::{Error, WaitCondition};

    #[test]
    fn test_exit_codes() {
        let e: Box<dyn std::error::Error> = Box::new(Error::Timeout(WaitCondition::FlashReady));
        assert_eq!(exit_code(e.as_ref()), 110);

        let e: Box<dyn std::error::Error> =
            Box::new(qspiflash_pcie::PcieError::InvalidAddress("x".into()));
        assert_eq!(exit_code(e.as_ref()), 22);

        let e: Box<dyn std::error::Error> = Box::new(commands::CommandError::Aborted);
        assert_eq!(exit_code(e.as_ref()), 125);

        let e: Box<dyn std::error::Error> = "something else".into();
        assert_eq!(exit_code(e.as_ref()), 1);
    }
}
