//! Hardware Abstraction Layer for the modem + UF2 engines
//!
//! This crate provides the trait seams behind which the external
//! collaborators live, so that the engines can be developed and tested
//! without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (board firmware)
//!         ↓
//! Engines (modem, uf2)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (UART / USB-CDC, SPI flash, NVS partition)
//! ```
//!
//! # Seams
//!
//! - [`Transport`] - byte sink towards the modem (blanket-implemented for
//!   every [`embedded_io_async::Write`])
//! - byte source - any [`embedded_io_async::Read`]
//! - flash partition - [`embedded_storage::nor_flash::NorFlash`]
//! - [`KvStore`] - namespaced string key/value store (NVS)
//!
//! # Features
//!
//! - `std`: Enable the [`mocks`] module outside of tests (host tooling and
//!   the engine crates' integration tests)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod kv;
pub mod transport;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

// Re-export main high-level traits
pub use kv::KvStore;
pub use transport::Transport;

// Re-export the flash traits so engine crates name one path.
pub use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};
