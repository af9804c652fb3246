//! UF2 virtual mass-storage engine.
//!
//! Serves a synthetic FAT16 volume over 512-byte sectors. The host sees
//! INFO_UF2.TXT, INDEX.HTM, CONFIG.INI (an NVS namespace as INI text) and
//! CURRENT.UF2 (the flash partition as UF2 blocks). Copying a `.uf2` file
//! onto the drive flashes it; saving CONFIG.INI updates NVS.
//!
//! # Layers
//!
//! ```text
//! SharedDisk (lock, Busy on contention)   shared.rs
//!         ↓
//! GhostFat (read_block / write_block)     ghostfat.rs
//!    ↓          ↓           ↓         ↓
//! fat.rs    catalog.rs   block.rs   ini.rs
//!    ↓                      ↓         ↓
//! layout.rs          FlashCache    KvStore
//!                    WriteState
//! ```
//!
//! # Features
//!
//! - `defmt`: log through defmt and derive `defmt::Format` on public types
//! - `tracing`: log through tracing (desktop builds)

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod block;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fat;
pub mod flash;
pub mod ghostfat;
pub mod ini;
pub mod layout;
pub mod shared;
pub mod write_state;

pub use block::Uf2Block;
pub use config::{BoardConfig, BuildDate};
pub use error::DiskError;
pub use ghostfat::{GhostFat, Uf2Hooks, WriteStatus};
pub use shared::SharedDisk;
pub use write_state::WriteState;
