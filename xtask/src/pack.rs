//! xtask pack: convert a raw application binary into UF2 blocks.
//!
//! Every block carries 256 payload bytes; the last one is zero-padded.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use uf2::block::{Uf2Block, BLOCK_SIZE, PAYLOAD_SIZE};
use uf2::BoardConfig;

#[allow(clippy::cast_possible_truncation)]
const CHUNK: usize = PAYLOAD_SIZE as usize;

/// Entry point called from main.rs
pub fn run(input: &Path, output: &Path, family: Option<u32>, base: Option<u32>) -> Result<()> {
    let board = BoardConfig::default();
    let family = family.unwrap_or(board.family_id);
    let base = base.unwrap_or(board.app_start);

    let binary =
        fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let uf2 = pack(&binary, base, family)?;
    fs::write(output, &uf2).with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "{}",
        format!(
            "✓ {} → {} ({} blocks, family {family:#010x}, base {base:#x})",
            input.display(),
            output.display(),
            uf2.len() / BLOCK_SIZE
        )
        .green()
    );
    Ok(())
}

/// Encode `binary` as UF2 blocks targeting `base`.
pub(crate) fn pack(binary: &[u8], base: u32, family: u32) -> Result<Vec<u8>> {
    let num_blocks = u32::try_from(binary.len().div_ceil(CHUNK))
        .context("binary too large for UF2")?;
    let mut out = Vec::with_capacity(binary.len().div_ceil(CHUNK).saturating_mul(BLOCK_SIZE));

    for (block_no, chunk) in (0u32..).zip(binary.chunks(CHUNK)) {
        let mut payload = [0u8; CHUNK];
        if let Some(dst) = payload.get_mut(..chunk.len()) {
            dst.copy_from_slice(chunk);
        }
        let addr = block_no
            .checked_mul(PAYLOAD_SIZE)
            .and_then(|offset| base.checked_add(offset))
            .context("binary runs past the 32-bit address space")?;
        tracing::debug!(block_no, addr, "packing block");
        let block = Uf2Block::firmware(addr, block_no, num_blocks, family, &payload);
        out.extend_from_slice(&block.encode());
    }
    Ok(out)
}
