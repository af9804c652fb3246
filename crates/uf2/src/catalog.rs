//! The fixed set of files on the volume and their cluster runs.
//!
//! Every file occupies one contiguous run of clusters, assigned by a single
//! forward pass from cluster 2. A file's FAT chain, directory entry and
//! data sectors are all derived from its run.

use heapless::Vec;

use crate::layout::{CLUSTER_SIZE, SECTORS_PER_CLUSTER};

/// Maximum number of files on the volume.
pub const MAX_FILES: usize = 6;

/// Clusters at or above this value resolve to CURRENT.UF2.
const RESERVED_CLUSTERS: u32 = 0xFFF0;

/// Which synthetic file an entry serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FileKind {
    /// INFO_UF2.TXT
    Info,
    /// INDEX.HTM
    Index,
    /// CONFIG.INI
    Config,
    /// AUTORUN.INF
    Autorun,
    /// FAVICON.ICO
    Favicon,
    /// CURRENT.UF2
    CurrentUf2,
}

impl FileKind {
    /// Space-padded 8.3 name as stored in the directory.
    #[must_use]
    pub fn short_name(self) -> &'static [u8; 11] {
        match self {
            Self::Info => b"INFO_UF2TXT",
            Self::Index => b"INDEX   HTM",
            Self::Config => b"CONFIG  INI",
            Self::Autorun => b"AUTORUN INF",
            Self::Favicon => b"FAVICON ICO",
            Self::CurrentUf2 => b"CURRENT UF2",
        }
    }
}

/// One file and its cluster run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    /// Which file this is.
    pub kind: FileKind,
    /// Size reported in the directory entry.
    pub size: u32,
    /// Bytes reserved in the data region; at least `size`.
    pub allocated: u32,
    /// First cluster of the run.
    pub cluster_start: u32,
    /// Last cluster of the run; `cluster_start - 1` when nothing is allocated.
    pub cluster_end: u32,
}

impl FileEntry {
    /// Whether any cluster belongs to this file.
    #[must_use]
    pub fn has_clusters(&self) -> bool {
        self.allocated > 0
    }

    /// Start cluster as written in the directory; 0 for empty files, whose
    /// run is left free in the FAT.
    #[must_use]
    pub fn first_cluster(&self) -> u32 {
        if self.size == 0 {
            0
        } else {
            self.cluster_start
        }
    }

    /// Sector of the data region where the file starts, relative to cluster 2.
    #[must_use]
    pub fn relative_start_sector(&self) -> u32 {
        self.cluster_start
            .saturating_sub(2)
            .saturating_mul(SECTORS_PER_CLUSTER)
    }
}

/// Ordered catalog; CURRENT.UF2 is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    files: Vec<FileEntry, MAX_FILES>,
}

impl Catalog {
    /// Lay out `(kind, size, allocated)` triples in order.
    ///
    /// The last triple must be CURRENT.UF2. Triples past [`MAX_FILES`] are
    /// dropped.
    #[must_use]
    pub fn new(layout: &[(FileKind, u32, u32)]) -> Self {
        let mut files = Vec::new();
        let mut next = 2u32;
        for &(kind, size, allocated) in layout {
            let clusters = allocated.div_ceil(CLUSTER_SIZE);
            let cluster_end = next.saturating_add(clusters).saturating_sub(1);
            let entry = FileEntry {
                kind,
                size,
                allocated,
                cluster_start: next,
                cluster_end,
            };
            if files.push(entry).is_err() {
                log_warn!("catalog full, file dropped");
                break;
            }
            next = cluster_end.saturating_add(1);
        }
        Self { files }
    }

    /// Files in directory order.
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Entry of `kind`, if present.
    #[must_use]
    pub fn get(&self, kind: FileKind) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.kind == kind)
    }

    /// Update the reported size of `kind` without moving any cluster run.
    /// The size is clamped to the allocation.
    pub fn set_size(&mut self, kind: FileKind, size: u32) {
        if let Some(f) = self.files.iter_mut().find(|f| f.kind == kind) {
            f.size = size.min(f.allocated);
        }
    }

    /// First cluster not used by any file.
    #[must_use]
    pub fn first_unused_cluster(&self) -> u32 {
        self.files
            .last()
            .map_or(2, |f| f.cluster_end.saturating_add(1))
    }

    /// File owning `cluster`. Clusters outside every run, reserved values
    /// included, resolve to the last file (CURRENT.UF2).
    #[must_use]
    pub fn index_of(&self, cluster: u32) -> Option<&FileEntry> {
        if cluster < RESERVED_CLUSTERS {
            if let Some(f) = self.files.iter().find(|f| {
                f.has_clusters() && f.cluster_start <= cluster && cluster <= f.cluster_end
            }) {
                return Some(f);
            }
        }
        self.files.last()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(&[
            (FileKind::Info, 120, 120),
            (FileKind::Index, 90, 90),
            (FileKind::Config, 0, 512),
            (FileKind::CurrentUf2, 2048, 2048),
        ])
    }

    #[test]
    fn test_runs_are_contiguous_from_cluster_two() {
        let c = catalog();
        let runs: std::vec::Vec<_> = c
            .files()
            .iter()
            .map(|f| (f.cluster_start, f.cluster_end))
            .collect();
        assert_eq!(runs, [(2, 2), (3, 3), (4, 4), (5, 8)]);
        assert_eq!(c.first_unused_cluster(), 9);
    }

    #[test]
    fn test_empty_file_reports_cluster_zero() {
        let c = catalog();
        let config = c.get(FileKind::Config).unwrap();
        assert!(config.has_clusters());
        assert_eq!(config.first_cluster(), 0);
    }

    #[test]
    fn test_index_of() {
        let c = catalog();
        assert_eq!(c.index_of(2).unwrap().kind, FileKind::Info);
        assert_eq!(c.index_of(4).unwrap().kind, FileKind::Config);
        assert_eq!(c.index_of(7).unwrap().kind, FileKind::CurrentUf2);
        assert_eq!(c.index_of(500).unwrap().kind, FileKind::CurrentUf2);
        assert_eq!(c.index_of(0xFFF5).unwrap().kind, FileKind::CurrentUf2);
    }

    #[test]
    fn test_set_size_keeps_runs() {
        let mut c = catalog();
        let before = c.clone();
        c.set_size(FileKind::Config, 4000);
        assert_eq!(c.get(FileKind::Config).unwrap().size, 512);
        for (a, b) in c.files().iter().zip(before.files()) {
            assert_eq!(a.cluster_start, b.cluster_start);
            assert_eq!(a.cluster_end, b.cluster_end);
        }
    }
}
