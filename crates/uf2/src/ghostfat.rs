//! The virtual FAT16 volume.
//!
//! Nothing is stored: every sector is computed on request from the catalog,
//! the flash partition and the NVS namespace. Writes are sniffed: UF2
//! firmware blocks go to flash wherever the host puts them, anything else is
//! mapped back through the cluster runs and only matters for CONFIG.INI.
//!
//! ```text
//! read_block(sector)
//!   0                      boot sector
//!   FAT0 / FAT1            fat::fill_fat_sector
//!   root directory         fat::fill_dir_sector
//!   data region ──index_of(cluster)──▶ file content | CURRENT.UF2 block
//!
//! write_block(sector, data)
//!   UF2 block, our family  ─▶ FlashCache ─▶ WriteState ─▶ flush + hook
//!   anything else          ─▶ CONFIG.INI shadow ─▶ ini::commit ─▶ hook
//! ```

use core::fmt::Write as _;

use embedded_storage::nor_flash::NorFlash;
use heapless::String;
use platform::KvStore;

use crate::block::{Uf2Block, PAYLOAD_SIZE};
use crate::catalog::{Catalog, FileEntry, FileKind, MAX_FILES};
use crate::config::BoardConfig;
use crate::error::DiskError;
use crate::fat::{self, BootSector};
use crate::flash::FlashCache;
use crate::ini::{self, INI_CAPACITY};
use crate::layout::{
    CLUSTER_LIMIT, SECTORS_PER_CLUSTER, SECTORS_PER_FAT, SECTOR_SIZE, START_CLUSTERS,
    START_FAT0, START_ROOTDIR, TOTAL_SECTORS,
};
use crate::write_state::WriteState;

/// Capacity of the generated INFO_UF2.TXT and INDEX.HTM texts.
const TEXT_CAPACITY: usize = 512;

const AUTORUN: &str = "[Autorun]\r\nIcon=FAVICON.ICO\r\n";

#[allow(clippy::cast_possible_truncation)] // 512
const SECTOR_BYTES: u32 = SECTOR_SIZE as u32;

/// Outcome of [`GhostFat::write_block`], as the mass-storage stack sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteStatus {
    /// A firmware block was written.
    Accepted,
    /// The engine is in use; the host should retry the same write.
    Busy,
    /// Not a firmware block for this board. Handled, must not be retried.
    NotFlash,
}

impl WriteStatus {
    /// Byte count returned to the USB MSC layer: 512, 0 or -1.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Accepted => 512,
            Self::Busy => 0,
            Self::NotFlash => -1,
        }
    }
}

/// Notifications from the engine to the application.
pub trait Uf2Hooks {
    /// CONFIG.INI edits were committed to NVS.
    fn nvs_modified(&mut self) {}

    /// Every block of the image has been written and flushed. Typically
    /// applies the update and reboots.
    fn update_complete(&mut self) {}
}

impl Uf2Hooks for () {}

/// GhostFAT engine over a flash partition and an NVS namespace.
pub struct GhostFat<F, S, H = ()> {
    flash: F,
    kv: S,
    hooks: H,
    config: BoardConfig,
    cache: FlashCache,
    catalog: Catalog,
    info: String<TEXT_CAPACITY>,
    index: String<TEXT_CAPACITY>,
    ini: String<INI_CAPACITY>,
    shadow: [u8; INI_CAPACITY],
}

impl<F, S, H> GhostFat<F, S, H>
where
    F: NorFlash,
    S: KvStore,
    H: Uf2Hooks,
{
    /// Build the volume: render the texts and lay out the catalog.
    pub fn new(flash: F, kv: S, config: BoardConfig, hooks: H) -> Result<Self, DiskError> {
        let mut disk = Self {
            flash,
            kv,
            hooks,
            config,
            cache: FlashCache::new(),
            catalog: Catalog::new(&[]),
            info: String::new(),
            index: String::new(),
            ini: String::new(),
            shadow: [0; INI_CAPACITY],
        };
        disk.render_texts();
        disk.render_ini()?;
        disk.catalog = disk.layout();

        if disk.catalog.first_unused_cluster() > CLUSTER_LIMIT {
            log_error!("partition of {} bytes does not fit the volume", disk.flash.capacity());
            return Err(DiskError::Capacity);
        }
        log_info!(
            "virtual disk ready, CURRENT.UF2 holds {} blocks",
            disk.uf2_block_count()
        );
        Ok(disk)
    }

    fn render_texts(&mut self) {
        let c = &self.config;
        self.info.clear();
        let info = write!(
            self.info,
            "APP Name: {}\r\nAPP Version: {}\r\nSDK version: {}\r\nModel: {}\r\nBoard-ID: {}\r\nDate: {}\r\n",
            c.app_name, c.app_version, c.sdk_version, c.model, c.board_id, c.build_date
        );
        self.index.clear();
        let index = write!(
            self.index,
            "<!doctype html>\n<html><body><script>\nlocation.replace(\"{}\");\n</script></body></html>\n",
            c.index_url
        );
        if info.is_err() || index.is_err() {
            log_warn!("board identity truncated");
        }
    }

    fn render_ini(&mut self) -> Result<(), DiskError> {
        let masking = self.config.masking();
        match ini::render(&self.kv, self.config.nvs_namespace, masking, &mut self.ini) {
            Ok(()) | Err(DiskError::IniTooLarge) => {}
            Err(e) => return Err(e),
        }
        self.shadow.fill(0);
        if let Some(dst) = self.shadow.get_mut(..self.ini.len()) {
            dst.copy_from_slice(self.ini.as_bytes());
        }
        Ok(())
    }

    fn layout(&self) -> Catalog {
        let info = len_u32(self.info.len());
        let index = len_u32(self.index.len());
        let ini = len_u32(self.ini.len());
        let uf2 = self.uf2_block_count().saturating_mul(SECTOR_BYTES);

        let mut files = heapless::Vec::<_, MAX_FILES>::new();
        let _ = files.push((FileKind::Info, info, info));
        let _ = files.push((FileKind::Index, index, index));
        let _ = files.push((FileKind::Config, ini, len_u32(INI_CAPACITY)));
        if let Some(icon) = self.config.favicon {
            let autorun = len_u32(AUTORUN.len());
            let icon = len_u32(icon.len());
            let _ = files.push((FileKind::Autorun, autorun, autorun));
            let _ = files.push((FileKind::Favicon, icon, icon));
        }
        let _ = files.push((FileKind::CurrentUf2, uf2, uf2));
        Catalog::new(&files)
    }

    /// Blocks in CURRENT.UF2: one per 256 bytes of partition.
    #[must_use]
    pub fn uf2_block_count(&self) -> u32 {
        len_u32(self.flash.capacity()) / PAYLOAD_SIZE
    }

    /// Files and their cluster runs.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Board identity in use.
    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Current CONFIG.INI text.
    #[must_use]
    pub fn ini_text(&self) -> &str {
        &self.ini
    }

    /// Flash partition.
    #[must_use]
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Key/value store.
    #[must_use]
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Key/value store, for application writes. Call
    /// [`GhostFat::refresh`] afterwards.
    pub fn kv_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    /// Re-render CONFIG.INI after NVS changed behind the engine.
    pub fn refresh(&mut self) -> Result<(), DiskError> {
        self.render_ini()?;
        self.catalog.set_size(FileKind::Config, len_u32(self.ini.len()));
        Ok(())
    }

    /// Write out any cached flash line.
    pub fn flush(&mut self) -> Result<(), DiskError> {
        self.cache
            .flush(&mut self.flash)
            .map(|_| ())
            .map_err(DiskError::flash)
    }

    /// Take the engine apart. Pending cached data is dropped; call
    /// [`GhostFat::flush`] first.
    pub fn into_parts(self) -> (F, S, H) {
        (self.flash, self.kv, self.hooks)
    }

    /// Produce the 512 bytes of `sector`. Sectors past the volume read as
    /// zeros.
    pub fn read_block(&mut self, sector: u32, out: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        out.fill(0);

        if sector == 0 {
            BootSector {
                volume_label: self.config.volume_label,
            }
            .encode(out);
        } else if sector < START_ROOTDIR {
            let mut rel = sector.saturating_sub(START_FAT0);
            if rel >= SECTORS_PER_FAT {
                rel = rel.saturating_sub(SECTORS_PER_FAT);
            }
            fat::fill_fat_sector(&self.catalog, rel, out);
        } else if sector < START_CLUSTERS {
            fat::fill_dir_sector(
                &self.catalog,
                self.config.volume_label,
                &self.config.build_date,
                sector.saturating_sub(START_ROOTDIR),
                out,
            );
        } else if sector < TOTAL_SECTORS {
            self.read_data(sector.saturating_sub(START_CLUSTERS), out)?;
        }
        Ok(())
    }

    fn read_data(&mut self, rel: u32, out: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        let Some(file) = self.catalog.index_of(cluster_of(rel)).copied() else {
            return Ok(());
        };
        let file_sector = rel.saturating_sub(file.relative_start_sector());

        if file.kind == FileKind::CurrentUf2 {
            return self.read_current_uf2(file_sector, out);
        }

        let content = self.content(file.kind);
        let size = content.len().min(usize::try_from(file.size).unwrap_or(usize::MAX));
        let start = usize::try_from(file_sector)
            .unwrap_or(usize::MAX)
            .saturating_mul(SECTOR_SIZE);
        if start < size {
            let end = size.min(start.saturating_add(SECTOR_SIZE));
            if let (Some(src), Some(dst)) = (
                content.get(start..end),
                out.get_mut(..end.saturating_sub(start)),
            ) {
                dst.copy_from_slice(src);
            }
        }
        Ok(())
    }

    fn content(&self, kind: FileKind) -> &[u8] {
        match kind {
            FileKind::Info => self.info.as_bytes(),
            FileKind::Index => self.index.as_bytes(),
            FileKind::Config => self.ini.as_bytes(),
            FileKind::Autorun => AUTORUN.as_bytes(),
            FileKind::Favicon => self.config.favicon.unwrap_or(&[]),
            FileKind::CurrentUf2 => &[],
        }
    }

    fn read_current_uf2(&mut self, block_no: u32, out: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        let count = self.uf2_block_count();
        if block_no >= count {
            return Ok(());
        }
        let offset = block_no.saturating_mul(PAYLOAD_SIZE);
        let mut payload = [0u8; PAYLOAD_SIZE as usize];
        self.cache
            .read(&mut self.flash, offset, &mut payload)
            .map_err(DiskError::flash)?;
        let block = Uf2Block::firmware(
            self.config.app_start.wrapping_add(offset),
            block_no,
            count,
            self.config.family_id,
            &payload,
        );
        out.copy_from_slice(&block.encode());
        Ok(())
    }

    /// Handle a host write of `sector`.
    ///
    /// Firmware blocks are written wherever the host puts them; their
    /// sector number is irrelevant. Every other write returns
    /// [`WriteStatus::NotFlash`], after updating NVS when it edited
    /// CONFIG.INI.
    pub fn write_block(
        &mut self,
        sector: u32,
        data: &[u8; SECTOR_SIZE],
        state: &mut WriteState,
    ) -> Result<WriteStatus, DiskError> {
        let block = Uf2Block::decode(data);
        if !block.is_firmware_block() {
            self.write_file_data(sector, data)?;
            return Ok(WriteStatus::NotFlash);
        }

        if block.family_id != self.config.family_id {
            log_warn!("UF2 block for family {} ignored", block.family_id);
            return Ok(WriteStatus::NotFlash);
        }
        let Some(offset) = self.flash_offset(&block) else {
            log_warn!("UF2 block {} outside the partition", block.block_no);
            return Ok(WriteStatus::NotFlash);
        };

        self.cache
            .write(&mut self.flash, offset, block.payload())
            .map_err(DiskError::flash)?;

        let fresh = state.record(block.block_no, block.num_blocks);
        log_debug!(
            "UF2 block {}/{} written",
            block.block_no,
            state.num_blocks()
        );
        if block.num_blocks != 0 && state.is_complete() {
            self.flush()?;
            if fresh {
                log_info!("UF2 update complete, {} blocks", state.num_written());
                self.hooks.update_complete();
            }
        }
        Ok(WriteStatus::Accepted)
    }

    fn flash_offset(&self, block: &Uf2Block) -> Option<u32> {
        let offset = block.target_addr.checked_sub(self.config.app_start)?;
        let end = offset.checked_add(block.payload_size)?;
        let fits = usize::try_from(end).is_ok_and(|end| end <= self.flash.capacity());
        (fits && block.payload().len() == usize::try_from(block.payload_size).ok()?)
            .then_some(offset)
    }

    fn write_file_data(&mut self, sector: u32, data: &[u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        if !(START_CLUSTERS..TOTAL_SECTORS).contains(&sector) {
            return Ok(());
        }
        let rel = sector.saturating_sub(START_CLUSTERS);
        let Some(mut file) = self.catalog.index_of(cluster_of(rel)).copied() else {
            return Ok(());
        };
        let mut file_sector = rel.saturating_sub(file.relative_start_sector());

        if file.kind == FileKind::CurrentUf2
            && data.first() == Some(&b'[')
            && self.config.redirect_stray_ini_writes
        {
            if let Some(config) = self.catalog.get(FileKind::Config) {
                log_debug!("stray INI write at sector {} redirected", sector);
                file = *config;
                file_sector = 0;
            }
        }
        if file.kind != FileKind::Config {
            return Ok(());
        }
        self.write_ini_sector(&file, file_sector, data)
    }

    fn write_ini_sector(
        &mut self,
        file: &FileEntry,
        file_sector: u32,
        data: &[u8; SECTOR_SIZE],
    ) -> Result<(), DiskError> {
        let start = usize::try_from(file_sector)
            .unwrap_or(usize::MAX)
            .saturating_mul(SECTOR_SIZE);
        let allocated = usize::try_from(file.allocated)
            .unwrap_or(INI_CAPACITY)
            .min(INI_CAPACITY);
        if start >= allocated {
            return Ok(());
        }
        let len = allocated.saturating_sub(start).min(SECTOR_SIZE);
        if let (Some(dst), Some(src)) = (
            self.shadow.get_mut(start..start.saturating_add(len)),
            data.get(..len),
        ) {
            dst.copy_from_slice(src);
        }

        let text = nul_terminated(&self.shadow);
        if text == self.ini.as_str() {
            return Ok(());
        }

        log_info!("CONFIG.INI changed, updating NVS");
        let written = ini::commit(
            &mut self.kv,
            self.config.nvs_namespace,
            text,
            self.config.masking(),
        );
        self.refresh()?;
        let written = written?;
        if written > 0 {
            self.hooks.nvs_modified();
        }
        Ok(())
    }
}

/// Cluster holding data-region sector `rel`.
fn cluster_of(rel: u32) -> u32 {
    (rel / SECTORS_PER_CLUSTER).saturating_add(2)
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Text up to the first NUL, cut at the last valid UTF-8 boundary.
fn nul_terminated(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = bytes.get(..end).unwrap_or(bytes);
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => bytes
            .get(..e.valid_up_to())
            .and_then(|b| core::str::from_utf8(b).ok())
            .unwrap_or(""),
    }
}
