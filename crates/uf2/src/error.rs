//! Errors reported by the virtual disk.

use embedded_storage::nor_flash::NorFlashErrorKind;
use thiserror_no_std::Error;

/// Failure of a disk operation.
///
/// Malformed or foreign UF2 blocks are not errors: they are reported through
/// [`WriteStatus::NotFlash`](crate::ghostfat::WriteStatus::NotFlash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DiskError {
    /// The flash partition rejected a read, erase or program.
    #[error("flash error: {0:?}")]
    Flash(NorFlashErrorKind),

    /// The key/value store failed.
    #[error("key/value store error")]
    Storage,

    /// The namespace does not fit in CONFIG.INI.
    #[error("CONFIG.INI capacity exceeded")]
    IniTooLarge,

    /// The partition is too large to be served as CURRENT.UF2 on this volume.
    #[error("partition does not fit the virtual volume")]
    Capacity,
}

impl DiskError {
    pub(crate) fn flash<E: embedded_storage::nor_flash::NorFlashError>(e: E) -> Self {
        Self::Flash(e.kind())
    }
}
