//! UF2 block codec.
//!
//! A UF2 file is a sequence of self-describing 512-byte blocks. All integers
//! are little-endian.
//!
//! ```text
//! [0..4]     magic_start0   0x0A324655 ("UF2\n")
//! [4..8]     magic_start1   0x9E5D5157
//! [8..12]    flags
//! [12..16]   target_addr
//! [16..20]   payload_size   256 for firmware images
//! [20..24]   block_no
//! [24..28]   num_blocks
//! [28..32]   family_id      (file size when the family flag is clear)
//! [32..508]  data
//! [508..512] magic_end      0x0AB16F30
//! ```

/// Size of one block on the wire.
pub const BLOCK_SIZE: usize = 512;
/// Size of the data area of a block.
pub const DATA_SIZE: usize = 476;
/// Payload bytes carried by blocks of a firmware image.
pub const PAYLOAD_SIZE: u32 = 256;

/// First start magic.
pub const MAGIC_START0: u32 = 0x0A32_4655;
/// Second start magic.
pub const MAGIC_START1: u32 = 0x9E5D_5157;
/// End magic.
pub const MAGIC_END: u32 = 0x0AB1_6F30;

/// Block is not meant for main flash.
pub const FLAG_NOT_MAIN_FLASH: u32 = 0x0000_0001;
/// Block is part of a file container.
pub const FLAG_FILE_CONTAINER: u32 = 0x0000_1000;
/// `family_id` is valid.
pub const FLAG_FAMILY_ID_PRESENT: u32 = 0x0000_2000;
/// Data area ends with an MD5 checksum.
pub const FLAG_MD5_PRESENT: u32 = 0x0000_4000;

const DATA_START: usize = 32;
const MAGIC_END_AT: usize = 508;

/// One decoded UF2 block, magics included so that any 512 bytes decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uf2Block {
    pub magic_start0: u32,
    pub magic_start1: u32,
    pub flags: u32,
    pub target_addr: u32,
    pub payload_size: u32,
    pub block_no: u32,
    pub num_blocks: u32,
    pub family_id: u32,
    pub data: [u8; DATA_SIZE],
    pub magic_end: u32,
}

impl Uf2Block {
    /// Build a main-flash block for `family_id` carrying `payload`.
    ///
    /// At most [`DATA_SIZE`] bytes of `payload` are kept.
    #[must_use]
    pub fn firmware(
        target_addr: u32,
        block_no: u32,
        num_blocks: u32,
        family_id: u32,
        payload: &[u8],
    ) -> Self {
        let mut data = [0u8; DATA_SIZE];
        let len = payload.len().min(DATA_SIZE);
        if let (Some(dst), Some(src)) = (data.get_mut(..len), payload.get(..len)) {
            dst.copy_from_slice(src);
        }
        #[allow(clippy::cast_possible_truncation)] // len <= DATA_SIZE
        let payload_size = len as u32;
        Self {
            magic_start0: MAGIC_START0,
            magic_start1: MAGIC_START1,
            flags: FLAG_FAMILY_ID_PRESENT,
            target_addr,
            payload_size,
            block_no,
            num_blocks,
            family_id,
            data,
            magic_end: MAGIC_END,
        }
    }

    /// Decode 512 bytes. Never fails; use [`Uf2Block::is_firmware_block`]
    /// to find out whether the bytes were a UF2 block at all.
    #[must_use]
    pub fn decode(buf: &[u8; BLOCK_SIZE]) -> Self {
        let mut data = [0u8; DATA_SIZE];
        if let Some(src) = buf.get(DATA_START..MAGIC_END_AT) {
            data.copy_from_slice(src);
        }
        Self {
            magic_start0: read_u32(buf, 0),
            magic_start1: read_u32(buf, 4),
            flags: read_u32(buf, 8),
            target_addr: read_u32(buf, 12),
            payload_size: read_u32(buf, 16),
            block_no: read_u32(buf, 20),
            num_blocks: read_u32(buf, 24),
            family_id: read_u32(buf, 28),
            data,
            magic_end: read_u32(buf, MAGIC_END_AT),
        }
    }

    /// Encode into 512 bytes.
    ///
    /// # Safety (lint allow)
    /// All range indices are compile-time constants within `[0, BLOCK_SIZE)`.
    #[must_use]
    #[allow(clippy::indexing_slicing)]
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.magic_start0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.magic_start1.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[12..16].copy_from_slice(&self.target_addr.to_le_bytes());
        buf[16..20].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.block_no.to_le_bytes());
        buf[24..28].copy_from_slice(&self.num_blocks.to_le_bytes());
        buf[28..32].copy_from_slice(&self.family_id.to_le_bytes());
        buf[DATA_START..MAGIC_END_AT].copy_from_slice(&self.data);
        buf[MAGIC_END_AT..].copy_from_slice(&self.magic_end.to_le_bytes());
        buf
    }

    /// All three magics match, the family flag is set and the block
    /// targets main flash.
    #[must_use]
    pub fn is_firmware_block(&self) -> bool {
        self.magic_start0 == MAGIC_START0
            && self.magic_start1 == MAGIC_START1
            && self.magic_end == MAGIC_END
            && self.flags & FLAG_FAMILY_ID_PRESENT != 0
            && self.flags & FLAG_NOT_MAIN_FLASH == 0
    }

    /// Payload bytes, clamped to the data area.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let len = usize::try_from(self.payload_size).unwrap_or(DATA_SIZE);
        self.data.get(..len).unwrap_or(&self.data)
    }
}

/// # Safety (lint allow)
/// Callers pass constant offsets no greater than `BLOCK_SIZE - 4`.
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
fn read_u32(buf: &[u8; BLOCK_SIZE], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn sample() -> Uf2Block {
        Uf2Block::firmware(0x1_0000, 3, 10, 0xc47e_5767, &[0xAB; 256])
    }

    #[test]
    fn test_firmware_block_layout() {
        let buf = sample().encode();
        assert_eq!(&buf[0..4], &[0x55, 0x46, 0x32, 0x0A]);
        assert_eq!(&buf[4..8], &MAGIC_START1.to_le_bytes());
        assert_eq!(&buf[8..12], &FLAG_FAMILY_ID_PRESENT.to_le_bytes());
        assert_eq!(&buf[12..16], &0x1_0000u32.to_le_bytes());
        assert_eq!(&buf[16..20], &256u32.to_le_bytes());
        assert_eq!(&buf[20..24], &3u32.to_le_bytes());
        assert_eq!(&buf[24..28], &10u32.to_le_bytes());
        assert_eq!(&buf[28..32], &0xc47e_5767u32.to_le_bytes());
        assert!(buf[32..288].iter().all(|&b| b == 0xAB));
        assert!(buf[288..508].iter().all(|&b| b == 0));
        assert_eq!(&buf[508..512], &[0x30, 0x6F, 0xB1, 0x0A]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let block = sample();
        assert_eq!(Uf2Block::decode(&block.encode()), block);
    }

    #[test]
    fn test_zero_sector_is_not_firmware() {
        assert!(!Uf2Block::decode(&[0u8; BLOCK_SIZE]).is_firmware_block());
    }

    #[test]
    fn test_flags_gate_classification() {
        let mut block = sample();
        assert!(block.is_firmware_block());

        block.flags = FLAG_FAMILY_ID_PRESENT | FLAG_NOT_MAIN_FLASH;
        assert!(!block.is_firmware_block());

        block.flags = 0;
        assert!(!block.is_firmware_block());

        block.flags = FLAG_FAMILY_ID_PRESENT | FLAG_MD5_PRESENT;
        assert!(block.is_firmware_block());
    }

    #[test]
    fn test_payload_is_clamped() {
        let mut block = sample();
        block.payload_size = 10_000;
        assert_eq!(block.payload().len(), DATA_SIZE);
        block.payload_size = 16;
        assert_eq!(block.payload(), &[0xAB; 16]);
    }
}
