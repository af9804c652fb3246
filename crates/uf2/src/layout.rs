//! Geometry of the virtual FAT16 volume.
//!
//! ```text
//! sector 0            boot sector (BPB)
//! START_FAT0 ..       FAT #0        (SECTORS_PER_FAT sectors)
//! START_FAT1 ..       FAT #1        (mirror of FAT #0)
//! START_ROOTDIR ..    root directory (ROOT_DIR_SECTORS sectors)
//! START_CLUSTERS ..   data region, cluster 2 first
//! TOTAL_SECTORS       end of volume
//! ```

// Every value here is evaluated at compile time; overflow is a build error.
#![allow(clippy::arithmetic_side_effects)]

/// Bytes per sector. Only 512 is supported.
pub const SECTOR_SIZE: usize = 512;
/// Sectors per cluster.
pub const SECTORS_PER_CLUSTER: u32 = 1;
/// Bytes per cluster.
pub const CLUSTER_SIZE: u32 = SECTOR_SIZE as u32 * SECTORS_PER_CLUSTER;
/// Sectors before the first FAT.
pub const RESERVED_SECTORS: u32 = 1;
/// Number of FAT copies.
pub const FAT_COPIES: u32 = 2;
/// Root directory capacity in entries.
pub const ROOT_DIR_ENTRIES: u32 = 64;
/// Total sectors of the volume.
pub const TOTAL_SECTORS: u32 = 0x0001_0109;
/// Fixed-disk media descriptor.
pub const MEDIA_DESCRIPTOR: u8 = 0xF8;
/// FAT16 end-of-chain marker.
pub const END_OF_CHAIN: u16 = 0xFFFF;

/// Size of one directory entry.
pub const DIR_ENTRY_SIZE: usize = 32;
/// Directory entries per sector.
pub const DIR_ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / DIR_ENTRY_SIZE) as u32;
/// FAT16 entries per sector.
pub const FAT_ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / 2) as u32;

/// Sectors of one FAT copy. FAT may be larger than needed.
pub const SECTORS_PER_FAT: u32 =
    TOTAL_SECTORS.div_ceil(SECTORS_PER_CLUSTER).div_ceil(FAT_ENTRIES_PER_SECTOR);
/// Sectors of the root directory.
pub const ROOT_DIR_SECTORS: u32 = ROOT_DIR_ENTRIES.div_ceil(DIR_ENTRIES_PER_SECTOR);

/// First sector of FAT #0.
pub const START_FAT0: u32 = RESERVED_SECTORS;
/// First sector of FAT #1.
pub const START_FAT1: u32 = START_FAT0 + SECTORS_PER_FAT;
/// First sector of the root directory.
pub const START_ROOTDIR: u32 = START_FAT1 + SECTORS_PER_FAT;
/// First sector of the data region (cluster 2).
pub const START_CLUSTERS: u32 = START_ROOTDIR + ROOT_DIR_SECTORS;

/// Data clusters of the volume.
pub const CLUSTER_COUNT: u32 = (TOTAL_SECTORS - START_CLUSTERS) / SECTORS_PER_CLUSTER;
/// First cluster number past the data region.
pub const CLUSTER_LIMIT: u32 = CLUSTER_COUNT + 2;

const _: () = assert!(SECTOR_SIZE == 512);
const _: () = assert!(SECTORS_PER_CLUSTER.is_power_of_two());
const _: () = assert!(CLUSTER_SIZE <= 32 * 1024);
const _: () = assert!(FAT_COPIES == 2);
const _: () = assert!(FAT_ENTRIES_PER_SECTOR == 256);
const _: () = assert!(ROOT_DIR_ENTRIES % DIR_ENTRIES_PER_SECTOR == 0);
const _: () = assert!(SECTORS_PER_FAT * FAT_ENTRIES_PER_SECTOR >= CLUSTER_LIMIT);
// Stay clear of the FAT12/FAT16/FAT32 boundaries that hosts get wrong.
const _: () = assert!(CLUSTER_COUNT >= 0x1015 && CLUSTER_COUNT < 0xFFD5);
