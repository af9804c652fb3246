//! Modem AT engine: command parser, 3GPP command set, DTE management.
//!
//! This crate is `no_std`; it only needs `core`, `heapless` and the embassy
//! synchronisation/time primitives.
//!
//! # Layers
//!
//! ```text
//! Dte (sync, readiness, dial, hang up)      dte.rs + retry.rs
//!         ↓
//! commands (AT+CSQ, AT+CPIN?, ATD, ...)     commands.rs
//!         ↓  AtChannel
//! AtParser (one command in flight)          parser.rs
//!         ↓                    ↑
//!    Transport (send)     pump / feed (receive)
//! ```
//!
//! # Features
//!
//! - `defmt`: log through defmt and derive `defmt::Format` on public types
//! - `tracing`: log through tracing (desktop builds)

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod channel;
pub mod commands;
pub mod config;
pub mod dte;
pub mod error;
pub mod parser;
pub mod retry;
pub mod rx;

pub use channel::AtChannel;
pub use config::{AtConfig, Readiness, RetryPolicy};
pub use dte::{Dte, PortMode, ReadinessReport};
pub use error::AtError;
pub use parser::{AtParser, ParserState};
pub use rx::{pump, PumpExit};
