//! xtask disk-image: dump the virtual drive to a FAT16 image.
//!
//! The drive runs over mock flash and NVS on the host. The image can be
//! checked with `fsck.vfat -n` or loop-mounted read-only.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use platform::mocks::{MockFlash, MockKvStore};
use uf2::ini::{self, Masking};
use uf2::layout::{SECTOR_SIZE, TOTAL_SECTORS};
use uf2::{BoardConfig, GhostFat};

/// Default app partition: 1 MiB.
pub const DEFAULT_PARTITION: usize = 0x10_0000;

/// Entry point called from main.rs
pub fn run(
    output: &Path,
    firmware: Option<&Path>,
    config: Option<&Path>,
    partition_size: usize,
) -> Result<()> {
    let start = Instant::now();

    let firmware = firmware
        .map(|p| fs::read(p).with_context(|| format!("failed to read {}", p.display())))
        .transpose()?;
    let config = config
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read {}", p.display())))
        .transpose()?;

    let mut disk = build(firmware.as_deref(), config.as_deref(), partition_size)?;
    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    dump(&mut disk, &mut out)?;
    out.flush()?;

    println!(
        "{}",
        format!(
            "✓ {} written ({} sectors, {} UF2 blocks) in {:.2}s",
            output.display(),
            TOTAL_SECTORS,
            disk.uf2_block_count(),
            start.elapsed().as_secs_f64()
        )
        .green()
    );
    Ok(())
}

/// Drive over a partition of `partition_size` bytes holding `firmware`, with
/// the pairs of `config` in NVS.
pub(crate) fn build(
    firmware: Option<&[u8]>,
    config: Option<&str>,
    partition_size: usize,
) -> Result<GhostFat<MockFlash, MockKvStore>> {
    let flash = match firmware {
        Some(image) if image.len() > partition_size => {
            anyhow::bail!(
                "firmware of {} bytes does not fit a {partition_size} byte partition",
                image.len()
            )
        }
        Some(image) => MockFlash::with_image(partition_size, image),
        None => MockFlash::new(partition_size),
    };

    let board = BoardConfig::default();
    let mut kv = MockKvStore::new();
    if let Some(text) = config {
        let n = ini::commit(&mut kv, board.nvs_namespace, text, Masking::default())
            .map_err(|e| anyhow!("failed to load config: {e}"))?;
        tracing::info!(keys = n, "config preloaded");
    }

    GhostFat::new(flash, kv, board, ()).map_err(|e| anyhow!("failed to build drive: {e}"))
}

/// Write every sector of the volume to `out`.
pub(crate) fn dump(disk: &mut GhostFat<MockFlash, MockKvStore>, out: &mut impl Write) -> Result<()> {
    let mut sector = [0u8; SECTOR_SIZE];
    for lba in 0..TOTAL_SECTORS {
        disk.read_block(lba, &mut sector)
            .map_err(|e| anyhow!("sector {lba}: {e}"))?;
        out.write_all(&sector)?;
    }
    Ok(())
}
