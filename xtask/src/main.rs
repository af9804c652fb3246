// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod disk_image;
mod pack;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Cellular modem and UF2 drive development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a raw application binary into a UF2 file
    Pack {
        /// Application binary
        input: PathBuf,
        /// UF2 file to write
        output: PathBuf,
        /// UF2 family ID (hex); defaults to the board's family
        #[arg(long, value_parser = parse_hex)]
        family: Option<u32>,
        /// Flash address of the first byte (hex); defaults to the app partition
        #[arg(long, value_parser = parse_hex)]
        base: Option<u32>,
    },
    /// Dump the virtual drive to a FAT16 image file
    DiskImage {
        /// Image file to write
        output: PathBuf,
        /// Application binary preloaded into the app partition
        #[arg(long)]
        firmware: Option<PathBuf>,
        /// INI file whose pairs are preloaded into NVS
        #[arg(long)]
        config: Option<PathBuf>,
        /// Size of the app partition in bytes
        #[arg(long, default_value_t = disk_image::DEFAULT_PARTITION)]
        partition_size: usize,
    },
    /// Check the no_std crates, clippy and formatting
    Check,
    /// Run all tests (unit, integration and doc)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
}

/// Parse `0x`-prefixed or bare hexadecimal.
fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value {s:?}: {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack {
            input,
            output,
            family,
            base,
        } => pack::run(&input, &output, family, base),
        Commands::DiskImage {
            output,
            firmware,
            config,
            partition_size,
        } => disk_image::run(
            &output,
            firmware.as_deref(),
            config.as_deref(),
            partition_size,
        ),
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
    }
}
