//! End-to-end behaviour of the virtual drive over mock flash and NVS.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

use std::cell::Cell;
use std::rc::Rc;

use platform::mocks::{MockFlash, MockKvStore};
use uf2::block::Uf2Block;
use uf2::catalog::FileKind;
use uf2::layout::{
    END_OF_CHAIN, FAT_ENTRIES_PER_SECTOR, SECTORS_PER_FAT, SECTOR_SIZE, START_CLUSTERS,
    START_FAT0, START_FAT1, START_ROOTDIR,
};
use uf2::{BoardConfig, GhostFat, Uf2Hooks, WriteState, WriteStatus};

const NS: &str = "uf2_nvs";
const FLASH_SIZE: usize = 8192;

#[derive(Clone, Default)]
struct Events {
    complete: Rc<Cell<u32>>,
    nvs: Rc<Cell<u32>>,
}

impl Uf2Hooks for Events {
    fn nvs_modified(&mut self) {
        self.nvs.set(self.nvs.get() + 1);
    }

    fn update_complete(&mut self) {
        self.complete.set(self.complete.get() + 1);
    }
}

type Disk = GhostFat<MockFlash, MockKvStore, Events>;

fn disk_with(config: BoardConfig, kv: MockKvStore) -> (Disk, Events) {
    let events = Events::default();
    let disk = GhostFat::new(MockFlash::new(FLASH_SIZE), kv, config, events.clone()).unwrap();
    (disk, events)
}

fn disk() -> (Disk, Events) {
    let mut kv = MockKvStore::new();
    kv.insert(NS, "ssid", "home");
    disk_with(BoardConfig::default(), kv)
}

fn read(disk: &mut Disk, sector: u32) -> [u8; SECTOR_SIZE] {
    let mut out = [0u8; SECTOR_SIZE];
    disk.read_block(sector, &mut out).unwrap();
    out
}

fn first_sector(disk: &Disk, kind: FileKind) -> u32 {
    START_CLUSTERS + disk.catalog().get(kind).unwrap().relative_start_sector()
}

fn text_sector(text: &str) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    sector[..text.len()].copy_from_slice(text.as_bytes());
    sector
}

fn as_text(sector: &[u8]) -> &str {
    let end = sector.iter().position(|&b| b == 0).unwrap_or(sector.len());
    std::str::from_utf8(&sector[..end]).unwrap()
}

fn image() -> Vec<u8> {
    (0..FLASH_SIZE).map(|i| (i * 7 % 251) as u8).collect()
}

fn firmware_block(config: &BoardConfig, block_no: u32, image: &[u8]) -> [u8; SECTOR_SIZE] {
    let count = (image.len() / 256) as u32;
    let start = block_no as usize * 256;
    Uf2Block::firmware(
        config.app_start + start as u32,
        block_no,
        count,
        config.family_id,
        &image[start..start + 256],
    )
    .encode()
}

fn fat_entry(disk: &mut Disk, cluster: u32) -> u16 {
    let sector = read(disk, START_FAT0 + cluster / FAT_ENTRIES_PER_SECTOR);
    let i = (cluster % FAT_ENTRIES_PER_SECTOR) as usize * 2;
    u16::from_le_bytes([sector[i], sector[i + 1]])
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_boot_sector_signature_and_label() {
    let (mut disk, _) = disk();
    let boot = read(&mut disk, 0);
    assert_eq!(boot[510], 0x55);
    assert_eq!(boot[511], 0xAA);
    assert_eq!(&boot[43..54], b"ESP32S3-UF2");
}

#[test]
fn test_fat_chains_match_catalog() {
    let (mut disk, _) = disk();
    let files = disk.catalog().files().to_vec();
    for file in files.iter().filter(|f| f.has_clusters()) {
        let mut visited = vec![file.cluster_start];
        let mut cluster = file.cluster_start;
        loop {
            let next = fat_entry(&mut disk, cluster);
            if next == END_OF_CHAIN {
                break;
            }
            cluster = u32::from(next);
            visited.push(cluster);
            assert!(visited.len() <= 1 + (file.cluster_end - file.cluster_start) as usize);
        }
        let expected: Vec<u32> = (file.cluster_start..=file.cluster_end).collect();
        assert_eq!(visited, expected, "{:?}", file.kind);
    }

    let unused = disk.catalog().first_unused_cluster();
    assert_eq!(fat_entry(&mut disk, unused), 0);
}

#[test]
fn test_second_fat_mirrors_first() {
    let (mut disk, _) = disk();
    for rel in [0, 1, SECTORS_PER_FAT - 1] {
        assert_eq!(read(&mut disk, START_FAT0 + rel), read(&mut disk, START_FAT1 + rel));
    }
}

#[test]
fn test_root_directory_lists_files() {
    let (mut disk, _) = disk();
    let dir = read(&mut disk, START_ROOTDIR);
    assert_eq!(&dir[0..11], b"ESP32S3-UF2");
    assert_eq!(dir[11], 0x28);
    let names: Vec<&[u8]> = (1..5).map(|i| &dir[i * 32..i * 32 + 11]).collect();
    assert_eq!(
        names,
        [
            &b"INFO_UF2TXT"[..],
            &b"INDEX   HTM"[..],
            &b"CONFIG  INI"[..],
            &b"CURRENT UF2"[..]
        ]
    );
    let uf2_size = u32::from_le_bytes(dir[4 * 32 + 28..4 * 32 + 32].try_into().unwrap());
    assert_eq!(uf2_size, (FLASH_SIZE / 256 * 512) as u32);
}

// ─────────────────────────────────────────────────────────────────────────────
// Non-firmware writes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_zero_sector_at_data_start_is_not_flash() {
    let (mut disk, _) = disk();
    let mut state = WriteState::new();
    let status = disk
        .write_block(START_CLUSTERS, &[0u8; SECTOR_SIZE], &mut state)
        .unwrap();
    assert_eq!(status, WriteStatus::NotFlash);
    assert_eq!(status.code(), -1);
    assert_eq!(state, WriteState::new());
    assert_eq!(disk.flash().write_count(), 0);
}

#[test]
fn test_foreign_family_is_ignored() {
    let (mut disk, events) = disk();
    let config = *disk.config();
    let mut state = WriteState::new();
    let block = Uf2Block::firmware(config.app_start, 0, 1, 0x1234_5678, &[0u8; 256]).encode();
    let status = disk.write_block(START_CLUSTERS + 50, &block, &mut state).unwrap();
    assert_eq!(status, WriteStatus::NotFlash);
    assert_eq!(state, WriteState::new());
    disk.flush().unwrap();
    assert_eq!(disk.flash().write_count(), 0);
    assert_eq!(events.complete.get(), 0);
}

#[test]
fn test_block_outside_partition_is_ignored() {
    let (mut disk, _) = disk();
    let config = *disk.config();
    let mut state = WriteState::new();
    let past_end = config.app_start + FLASH_SIZE as u32;
    let below = config.app_start - 256;
    for addr in [past_end, below] {
        let block = Uf2Block::firmware(addr, 0, 1, config.family_id, &[0u8; 256]).encode();
        let status = disk.write_block(600, &block, &mut state).unwrap();
        assert_eq!(status, WriteStatus::NotFlash);
    }
    assert_eq!(state.num_written(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Flashing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_full_update_is_flushed_once_complete() {
    let (mut disk, events) = disk();
    let config = *disk.config();
    let image = image();
    let count = (FLASH_SIZE / 256) as u32;
    let mut state = WriteState::new();

    for block_no in 0..count {
        // Hosts place file data wherever they like.
        let sector = START_CLUSTERS + 2000 + block_no * 3;
        let status = disk
            .write_block(sector, &firmware_block(&config, block_no, &image), &mut state)
            .unwrap();
        assert_eq!(status, WriteStatus::Accepted);
        assert_eq!(status.code(), 512);
        if block_no == 5 {
            disk.write_block(sector, &firmware_block(&config, 5, &image), &mut state)
                .unwrap();
            assert_eq!(state.num_written(), 6);
        }
        if block_no + 1 < count {
            assert_eq!(events.complete.get(), 0);
        }
    }

    assert!(state.is_complete());
    assert_eq!(state.num_written(), count);
    assert_eq!(events.complete.get(), 1);
    assert_eq!(disk.flash().contents(), image.as_slice());
}

#[test]
fn test_current_uf2_reflects_flash() {
    let (mut disk, _) = disk();
    let config = *disk.config();
    let image = image();
    let mut state = WriteState::new();
    for block_no in 0..(FLASH_SIZE / 256) as u32 {
        disk.write_block(700, &firmware_block(&config, block_no, &image), &mut state)
            .unwrap();
    }

    let sector = first_sector(&disk, FileKind::CurrentUf2) + 3;
    let raw = read(&mut disk, sector);
    let block = Uf2Block::decode(&raw);
    assert!(block.is_firmware_block());
    assert_eq!(block.block_no, 3);
    assert_eq!(block.num_blocks, (FLASH_SIZE / 256) as u32);
    assert_eq!(block.target_addr, config.app_start + 768);
    assert_eq!(block.family_id, config.family_id);
    assert_eq!(block.payload(), &image[768..1024]);
}

#[test]
fn test_pending_writes_are_visible_before_flush() {
    let (mut disk, _) = disk();
    let config = *disk.config();
    let image = image();
    let mut state = WriteState::new();
    disk.write_block(700, &firmware_block(&config, 1, &image), &mut state)
        .unwrap();
    assert_eq!(disk.flash().write_count(), 0);

    let sector = first_sector(&disk, FileKind::CurrentUf2) + 1;
    let raw = read(&mut disk, sector);
    assert_eq!(Uf2Block::decode(&raw).payload(), &image[256..512]);
}

#[test]
fn test_reflashing_same_image_does_not_touch_flash() {
    let (mut disk, events) = disk();
    let config = *disk.config();
    let image = image();
    let count = (FLASH_SIZE / 256) as u32;

    let mut state = WriteState::new();
    for block_no in 0..count {
        disk.write_block(700, &firmware_block(&config, block_no, &image), &mut state)
            .unwrap();
    }
    assert!(disk.flash().erase_count() > 0);

    let (flash, kv, hooks) = disk.into_parts();
    let mut flash = flash;
    flash.reset_counters();
    let mut disk = GhostFat::new(flash, kv, config, hooks).unwrap();

    let mut state = WriteState::new();
    for block_no in 0..count {
        disk.write_block(700, &firmware_block(&config, block_no, &image), &mut state)
            .unwrap();
    }
    assert!(state.is_complete());
    assert_eq!(disk.flash().erase_count(), 0);
    assert_eq!(disk.flash().write_count(), 0);
    assert_eq!(events.complete.get(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// CONFIG.INI
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_ini_edit_updates_nvs() {
    let (mut disk, events) = disk();
    let sector = first_sector(&disk, FileKind::Config);
    assert_eq!(as_text(&read(&mut disk, sector)), "[uf2_nvs]\r\nssid = home\r\n");

    let mut state = WriteState::new();
    let edited = text_sector("[uf2_nvs]\r\nssid = office\r\nport = 80\r\n");
    let status = disk.write_block(sector, &edited, &mut state).unwrap();
    assert_eq!(status, WriteStatus::NotFlash);
    assert_eq!(disk.kv().committed(NS, "ssid"), Some("office"));
    assert_eq!(disk.kv().committed(NS, "port"), Some("80"));
    assert_eq!(events.nvs.get(), 1);

    let rendered = "[uf2_nvs]\r\nport = 80\r\nssid = office\r\n";
    assert_eq!(as_text(&read(&mut disk, sector)), rendered);

    // Directory entry 3 is CONFIG.INI (label, info, index before it).
    let dir = read(&mut disk, START_ROOTDIR);
    let size = u32::from_le_bytes(dir[3 * 32 + 28..3 * 32 + 32].try_into().unwrap());
    assert_eq!(size as usize, rendered.len());

    // Saving the same values again changes nothing.
    disk.write_block(sector, &edited, &mut state).unwrap();
    assert_eq!(events.nvs.get(), 1);
    assert_eq!(state, WriteState::new());
}

#[test]
fn test_config_ini_edit_keeps_untouched_values() {
    let mut kv = MockKvStore::new();
    kv.insert(NS, "password", "abc ;def");
    kv.insert(NS, "ssid", "home");
    let (mut disk, events) = disk_with(BoardConfig::default(), kv);
    let sector = first_sector(&disk, FileKind::Config);
    let rendered = as_text(&read(&mut disk, sector)).to_owned();
    assert_eq!(rendered, "[uf2_nvs]\r\npassword = \"abc ;def\"\r\nssid = home\r\n");

    let mut state = WriteState::new();
    let edited = rendered.replace("ssid = home", "ssid = work");
    disk.write_block(sector, &text_sector(&edited), &mut state).unwrap();
    assert_eq!(disk.kv().committed(NS, "password"), Some("abc ;def"));
    assert_eq!(disk.kv().committed(NS, "ssid"), Some("work"));
    assert_eq!(events.nvs.get(), 1);
}

#[test]
fn test_stray_ini_write_is_redirected() {
    let (mut disk, events) = disk();
    let stray = first_sector(&disk, FileKind::CurrentUf2) + 10;
    let mut state = WriteState::new();
    disk.write_block(stray, &text_sector("[uf2_nvs]\r\nssid = lab\r\n"), &mut state)
        .unwrap();
    assert_eq!(disk.kv().committed(NS, "ssid"), Some("lab"));
    assert_eq!(events.nvs.get(), 1);
}

#[test]
fn test_stray_ini_write_ignored_when_disabled() {
    let mut kv = MockKvStore::new();
    kv.insert(NS, "ssid", "home");
    let config = BoardConfig {
        redirect_stray_ini_writes: false,
        ..BoardConfig::default()
    };
    let (mut disk, events) = disk_with(config, kv);
    let stray = first_sector(&disk, FileKind::CurrentUf2) + 10;
    let mut state = WriteState::new();
    disk.write_block(stray, &text_sector("[uf2_nvs]\r\nssid = lab\r\n"), &mut state)
        .unwrap();
    assert_eq!(disk.kv().committed(NS, "ssid"), Some("home"));
    assert_eq!(events.nvs.get(), 0);
}

#[test]
fn test_hidden_values_survive_round_trip() {
    let mut kv = MockKvStore::new();
    kv.insert(NS, "password", "hunter2");
    kv.insert(NS, "ssid", "home");
    let config = BoardConfig {
        hidden_keys: &["password"],
        ..BoardConfig::default()
    };
    let (mut disk, _) = disk_with(config, kv);
    let sector = first_sector(&disk, FileKind::Config);
    let shown = read(&mut disk, sector);
    assert_eq!(
        as_text(&shown),
        "[uf2_nvs]\r\npassword = ****\r\nssid = home\r\n"
    );

    let mut state = WriteState::new();
    let edited = text_sector("[uf2_nvs]\r\npassword = ****\r\nssid = cafe\r\n");
    disk.write_block(sector, &edited, &mut state).unwrap();
    assert_eq!(disk.kv().committed(NS, "password"), Some("hunter2"));
    assert_eq!(disk.kv().committed(NS, "ssid"), Some("cafe"));
}

#[test]
fn test_refresh_after_application_change() {
    let (mut disk, _) = disk();
    disk.kv_mut().insert(NS, "mode", "ppp");
    disk.refresh().unwrap();
    let sector = first_sector(&disk, FileKind::Config);
    assert_eq!(
        as_text(&read(&mut disk, sector)),
        "[uf2_nvs]\r\nmode = ppp\r\nssid = home\r\n"
    );
}
