//! Progress of one UF2 flashing session.

use core::fmt;

/// Largest image tracked block by block: 4 MiB of payload plus slack.
#[allow(clippy::arithmetic_side_effects)]
pub const MAX_BLOCKS: u32 = 4 * 1024 * 1024 / 256 + 100;

#[allow(clippy::arithmetic_side_effects)]
const MASK_LEN: usize = MAX_BLOCKS as usize / 8 + 1;

/// `num_blocks` once blocks disagreed on the image size.
pub const UNBOUNDED: u32 = u32::MAX;

/// Blocks seen so far, deduplicated by block number.
///
/// Hosts may write the same block more than once; only the first write of a
/// block number counts towards completion.
#[derive(Clone, PartialEq, Eq)]
pub struct WriteState {
    num_blocks: u32,
    num_written: u32,
    written: [u8; MASK_LEN],
}

impl WriteState {
    /// Fresh session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            num_blocks: 0,
            num_written: 0,
            written: [0; MASK_LEN],
        }
    }

    /// Image size in blocks; 0 until known, [`UNBOUNDED`] after a mismatch.
    #[must_use]
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Distinct blocks written.
    #[must_use]
    pub fn num_written(&self) -> u32 {
        self.num_written
    }

    /// Every announced block has been written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.num_blocks != 0 && self.num_written >= self.num_blocks
    }

    /// Account for a flashed block. Returns `true` when `block_no` had not
    /// been seen before.
    ///
    /// Blocks without a `num_blocks` field are not tracked.
    pub fn record(&mut self, block_no: u32, num_blocks: u32) -> bool {
        if num_blocks == 0 {
            return false;
        }
        if self.num_blocks != num_blocks {
            self.num_blocks = if num_blocks >= MAX_BLOCKS || self.num_blocks != 0 {
                UNBOUNDED
            } else {
                num_blocks
            };
        }
        if block_no >= MAX_BLOCKS {
            return false;
        }

        // Safety: block_no < MAX_BLOCKS so pos < MASK_LEN and the shift is < 8.
        #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
        let (pos, mask) = ((block_no / 8) as usize, 1u8 << (block_no % 8));
        let Some(byte) = self.written.get_mut(pos) else {
            return false;
        };
        if *byte & mask != 0 {
            return false;
        }
        *byte |= mask;
        self.num_written = self.num_written.saturating_add(1);
        true
    }

    /// Start over.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for WriteState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteState")
            .field("num_blocks", &self.num_blocks)
            .field("num_written", &self.num_written)
            .finish_non_exhaustive()
    }
}
