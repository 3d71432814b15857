//! Man page generator for qspiflash
//!
//! Writes `qspiflash.1` plus one `qspiflash-<command>.1` page per
//! subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, path: &Path) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    fs::write(path, buffer)?;
    println!("Generated {}", path.display());
    Ok(())
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    for sub in cmd.get_subcommands() {
        let path = output_dir.join(format!("qspiflash-{}.1", sub.get_name()));
        render(sub.clone(), &path)?;
    }
    render(cmd, &output_dir.join("qspiflash.1"))?;

    println!("\nTo view: man -l {}", output_dir.join("qspiflash.1").display());
    Ok(())
}
