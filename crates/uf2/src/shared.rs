//! The engine behind a lock, shared by the mass-storage task and the
//! application.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embedded_storage::nor_flash::NorFlash;
use platform::KvStore;

use crate::error::DiskError;
use crate::ghostfat::{GhostFat, Uf2Hooks, WriteStatus};
use crate::layout::SECTOR_SIZE;
use crate::write_state::WriteState;

/// [`GhostFat`] guarded by an async mutex.
///
/// Reads wait for the lock. Writes never wait: while the application holds
/// the engine they report [`WriteStatus::Busy`] and the host repeats them.
pub struct SharedDisk<M: RawMutex, F, S, H = ()> {
    inner: Mutex<M, GhostFat<F, S, H>>,
}

impl<M, F, S, H> SharedDisk<M, F, S, H>
where
    M: RawMutex,
    F: NorFlash,
    S: KvStore,
    H: Uf2Hooks,
{
    /// Wrap `disk`.
    pub fn new(disk: GhostFat<F, S, H>) -> Self {
        Self {
            inner: Mutex::new(disk),
        }
    }

    /// See [`GhostFat::read_block`].
    pub async fn read_block(
        &self,
        sector: u32,
        out: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), DiskError> {
        self.inner.lock().await.read_block(sector, out)
    }

    /// See [`GhostFat::write_block`]; [`WriteStatus::Busy`] when the engine
    /// is locked.
    pub fn write_block(
        &self,
        sector: u32,
        data: &[u8; SECTOR_SIZE],
        state: &mut WriteState,
    ) -> Result<WriteStatus, DiskError> {
        match self.inner.try_lock() {
            Ok(mut disk) => disk.write_block(sector, data, state),
            Err(_) => {
                log_debug!("disk busy, write of sector {} deferred", sector);
                Ok(WriteStatus::Busy)
            }
        }
    }

    /// Exclusive access for application code, e.g. NVS edits followed by
    /// [`GhostFat::refresh`].
    pub async fn lock(&self) -> MutexGuard<'_, M, GhostFat<F, S, H>> {
        self.inner.lock().await
    }

    /// Give the engine back.
    pub fn into_inner(self) -> GhostFat<F, S, H> {
        self.inner.into_inner()
    }
}
