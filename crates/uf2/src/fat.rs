//! FAT16 on-disk structures, synthesised sector by sector.

use crate::catalog::Catalog;
use crate::config::BuildDate;
use crate::layout::{
    DIR_ENTRIES_PER_SECTOR, DIR_ENTRY_SIZE, END_OF_CHAIN, FAT_COPIES, FAT_ENTRIES_PER_SECTOR,
    MEDIA_DESCRIPTOR, RESERVED_SECTORS, ROOT_DIR_ENTRIES, SECTORS_PER_CLUSTER, SECTORS_PER_FAT,
    SECTOR_SIZE, TOTAL_SECTORS,
};

/// Directory attribute of the volume label entry (archive + volume id).
pub const ATTR_VOLUME_LABEL: u8 = 0x28;

const VOLUME_SERIAL: u32 = 0x0042_0042;

/// Copy `src` into `dst`, padding with spaces.
pub fn padded_copy(dst: &mut [u8], src: &[u8]) {
    for (i, d) in dst.iter_mut().enumerate() {
        *d = src.get(i).copied().unwrap_or(b' ');
    }
}

/// Boot sector with the BIOS parameter block.
///
/// ```text
/// [0..3]    jump            EB 3C 90
/// [3..11]   OEM name        "UF2 UF2 "
/// [11..13]  bytes/sector    [13] sectors/cluster   [14..16] reserved sectors
/// [16]      FAT copies      [17..19] root entries  [19..21] total sectors (16 bit)
/// [21]      media           [22..24] sectors/FAT   [24..26] sectors/track
/// [26..28]  heads           [28..32] hidden        [32..36] total sectors (32 bit)
/// [36]      drive number    [37] reserved          [38] extended signature 0x29
/// [39..43]  serial          [43..54] volume label  [54..62] "FAT16   "
/// [510..512] 55 AA
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector<'a> {
    pub volume_label: &'a str,
}

impl BootSector<'_> {
    /// Offset of the volume label.
    pub const LABEL_OFFSET: usize = 43;

    /// Write the boot sector into a zeroed sector buffer.
    ///
    /// # Safety (lint allow)
    /// All range indices are compile-time constants within `[0, SECTOR_SIZE)`.
    #[allow(clippy::indexing_slicing, clippy::cast_possible_truncation)]
    pub fn encode(&self, out: &mut [u8; SECTOR_SIZE]) {
        let (total16, total32) = if TOTAL_SECTORS > 0xFFFF {
            (0u16, TOTAL_SECTORS)
        } else {
            (TOTAL_SECTORS as u16, 0)
        };
        out[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        out[3..11].copy_from_slice(b"UF2 UF2 ");
        out[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        out[13] = SECTORS_PER_CLUSTER as u8;
        out[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        out[16] = FAT_COPIES as u8;
        out[17..19].copy_from_slice(&(ROOT_DIR_ENTRIES as u16).to_le_bytes());
        out[19..21].copy_from_slice(&total16.to_le_bytes());
        out[21] = MEDIA_DESCRIPTOR;
        out[22..24].copy_from_slice(&(SECTORS_PER_FAT as u16).to_le_bytes());
        out[24..26].copy_from_slice(&1u16.to_le_bytes());
        out[26..28].copy_from_slice(&1u16.to_le_bytes());
        out[28..32].copy_from_slice(&0u32.to_le_bytes());
        out[32..36].copy_from_slice(&total32.to_le_bytes());
        out[36] = 0x80;
        out[37] = 0;
        out[38] = 0x29;
        out[39..43].copy_from_slice(&VOLUME_SERIAL.to_le_bytes());
        padded_copy(&mut out[Self::LABEL_OFFSET..54], self.volume_label.as_bytes());
        out[54..62].copy_from_slice(b"FAT16   ");
        out[510] = 0x55;
        out[511] = 0xAA;
    }
}

/// A 32-byte short-name directory entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attrs: u8,
    pub create_time_fine: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub last_access_date: u16,
    pub high_start_cluster: u16,
    pub update_time: u16,
    pub update_date: u16,
    pub start_cluster: u16,
    pub size: u32,
}

impl DirEntry {
    /// Regular file entry stamped with `date`.
    #[must_use]
    // Safety: the shift is by a constant below the bit width.
    #[allow(clippy::cast_possible_truncation, clippy::arithmetic_side_effects)]
    pub fn file(name: &[u8; 11], start_cluster: u32, size: u32, date: &BuildDate) -> Self {
        Self {
            name: *name,
            attrs: 0,
            create_time_fine: date.dos_time_fine(),
            create_time: date.dos_time(),
            create_date: date.dos_date(),
            last_access_date: date.dos_date(),
            high_start_cluster: (start_cluster >> 16) as u16,
            update_time: date.dos_time(),
            update_date: date.dos_date(),
            start_cluster: (start_cluster & 0xFFFF) as u16,
            size,
        }
    }

    /// Volume label entry.
    #[must_use]
    pub fn volume_label(label: &str) -> Self {
        let mut name = [b' '; 11];
        padded_copy(&mut name, label.as_bytes());
        Self {
            name,
            attrs: ATTR_VOLUME_LABEL,
            ..Self::default()
        }
    }

    /// Encode into 32 bytes.
    ///
    /// # Safety (lint allow)
    /// All range indices are compile-time constants within `[0, DIR_ENTRY_SIZE)`.
    #[must_use]
    #[allow(clippy::indexing_slicing)]
    pub fn encode(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        buf[0..11].copy_from_slice(&self.name);
        buf[11] = self.attrs;
        buf[13] = self.create_time_fine;
        buf[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        buf[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        buf[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        buf[20..22].copy_from_slice(&self.high_start_cluster.to_le_bytes());
        buf[22..24].copy_from_slice(&self.update_time.to_le_bytes());
        buf[24..26].copy_from_slice(&self.update_date.to_le_bytes());
        buf[26..28].copy_from_slice(&self.start_cluster.to_le_bytes());
        buf[28..32].copy_from_slice(&self.size.to_le_bytes());
        buf
    }
}

/// Fill sector `rel` of a FAT copy.
///
/// Runs are contiguous, so cluster `n` links to `n + 1` unless it ends a
/// file (end of chain), belongs to an empty file or lies past the last used
/// cluster (free).
pub fn fill_fat_sector(catalog: &Catalog, rel: u32, out: &mut [u8; SECTOR_SIZE]) {
    let first = rel.saturating_mul(FAT_ENTRIES_PER_SECTOR);
    let unused = catalog.first_unused_cluster();

    for (i, entry) in out.chunks_exact_mut(2).enumerate() {
        #[allow(clippy::cast_possible_truncation)] // i < FAT_ENTRIES_PER_SECTOR
        let cluster = first.saturating_add(i as u32);
        #[allow(clippy::cast_possible_truncation)] // cluster < unused <= 0xFFF0
        let value = if cluster >= unused {
            0
        } else {
            cluster.saturating_add(1) as u16
        };
        entry.copy_from_slice(&value.to_le_bytes());
    }

    if rel == 0 {
        set_fat_entry(out, 0, u16::from_le_bytes([MEDIA_DESCRIPTOR, 0xFF]));
        set_fat_entry(out, 1, END_OF_CHAIN);
    }

    for file in catalog.files().iter().filter(|f| f.has_clusters()) {
        if file.first_cluster() == 0 {
            // Empty files have no chain; their reserved run reads as free.
            for cluster in file.cluster_start..=file.cluster_end {
                if let Some(idx) = cluster.checked_sub(first) {
                    if idx < FAT_ENTRIES_PER_SECTOR {
                        set_fat_entry(out, idx, 0);
                    }
                }
            }
        } else if let Some(idx) = file.cluster_end.checked_sub(first) {
            if idx < FAT_ENTRIES_PER_SECTOR {
                set_fat_entry(out, idx, END_OF_CHAIN);
            }
        }
    }
}

fn set_fat_entry(out: &mut [u8; SECTOR_SIZE], idx: u32, value: u16) {
    let Ok(idx) = usize::try_from(idx) else {
        return;
    };
    if let Some(entry) = out.chunks_exact_mut(2).nth(idx) {
        entry.copy_from_slice(&value.to_le_bytes());
    }
}

/// Fill sector `rel` of the root directory: the volume label first, then
/// one entry per catalog file.
pub fn fill_dir_sector(
    catalog: &Catalog,
    volume_label: &str,
    date: &BuildDate,
    rel: u32,
    out: &mut [u8; SECTOR_SIZE],
) {
    let mut slots = out.chunks_exact_mut(DIR_ENTRY_SIZE);

    // The label takes slot 0 of sector 0, shifting every later file by one.
    let first_file = if rel == 0 {
        if let Some(slot) = slots.next() {
            slot.copy_from_slice(&DirEntry::volume_label(volume_label).encode());
        }
        0
    } else {
        rel.saturating_mul(DIR_ENTRIES_PER_SECTOR).saturating_sub(1)
    };
    let first_file = usize::try_from(first_file).unwrap_or(usize::MAX);

    for (slot, file) in slots.zip(catalog.files().iter().skip(first_file)) {
        let entry = DirEntry::file(file.kind.short_name(), file.first_cluster(), file.size, date);
        slot.copy_from_slice(&entry.encode());
    }
}
