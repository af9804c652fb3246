//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests, and for the host-side xtask
//! tooling (`std` feature).

#![cfg(any(test, feature = "std"))]
#![allow(clippy::arithmetic_side_effects)] // host-only: sizes are bounded by Vec lengths
#![allow(clippy::indexing_slicing)] // host-only: every range is validated by check_* first

use std::collections::{BTreeMap, VecDeque};
use std::string::{String, ToString};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use embedded_io::{ErrorKind, ErrorType};
use embedded_io_async::{Read, Write};
use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType as FlashErrorType, NorFlash,
    NorFlashErrorKind, ReadNorFlash,
};

use crate::kv::KvStore;

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Shared record of every buffer handed to a [`MockTransport`].
#[derive(Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    /// Every buffer sent so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Sent buffers decoded as text (lossy).
    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    fn push(&self, bytes: &[u8]) {
        if let Ok(mut v) = self.0.lock() {
            v.push(bytes.to_vec());
        }
    }
}

/// Mock modem link: records what the parser sends.
pub struct MockTransport {
    log: SentLog,
    fail: bool,
}

impl MockTransport {
    /// Create new mock transport
    pub fn new() -> Self {
        Self {
            log: SentLog::default(),
            fail: false,
        }
    }

    /// A transport whose every write fails with [`ErrorKind::BrokenPipe`].
    pub fn failing() -> Self {
        Self {
            log: SentLog::default(),
            fail: true,
        }
    }

    /// Handle on the sent-buffer log that stays valid after the transport
    /// has been moved into a parser.
    pub fn log(&self) -> SentLog {
        self.log.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for MockTransport {
    type Error = ErrorKind;
}

impl Write for MockTransport {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail {
            return Err(ErrorKind::BrokenPipe);
        }
        self.log.push(buf);
        Ok(buf.len())
    }
}

/// Mock byte source delivering a scripted sequence of chunks.
///
/// A read with a buffer smaller than the pending chunk returns the head of
/// the chunk and keeps the remainder for the next read. Once every chunk is
/// consumed, reads return `Ok(0)` (end of stream).
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkedReader {
    /// Create a reader that yields `chunks` in order.
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
        }
    }
}

impl ErrorType for ChunkedReader {
    type Error = ErrorKind;
}

impl Read for ChunkedReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            let rest = chunk.split_off(n);
            self.chunks.push_front(rest);
        }
        Ok(n)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flash
// ─────────────────────────────────────────────────────────────────────────────

/// Mock NOR flash partition.
///
/// Erase sets bytes to `0xFF`; program can only clear bits (stored value is
/// `old & new`), so writing without erasing first is observable in tests.
pub struct MockFlash {
    data: Vec<u8>,
    erase_count: usize,
    write_count: usize,
    fail_writes: bool,
}

impl MockFlash {
    /// Create an erased partition of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: std::vec![0xFF; size],
            erase_count: 0,
            write_count: 0,
            fail_writes: false,
        }
    }

    /// Create a partition of `size` bytes whose head holds `image`.
    pub fn with_image(size: usize, image: &[u8]) -> Self {
        let mut flash = Self::new(size);
        let n = image.len().min(size);
        flash.data[..n].copy_from_slice(&image[..n]);
        flash
    }

    /// Raw partition contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Number of erase-sector operations performed.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Number of program calls performed.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Reset the operation counters.
    pub fn reset_counters(&mut self) {
        self.erase_count = 0;
        self.write_count = 0;
    }

    /// Make erase and program fail
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl FlashErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        self.data[from as usize..to as usize].fill(0xFF);
        self.erase_count += (to - from) as usize / Self::ERASE_SIZE;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        for (dst, src) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *dst &= *src;
        }
        self.write_count += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key/value store
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned by [`MockKvStore`] when it has been told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockKvError;

/// Mock NVS: staged and committed maps per namespace.
#[derive(Default)]
pub struct MockKvStore {
    staged: BTreeMap<String, BTreeMap<String, String>>,
    committed: BTreeMap<String, BTreeMap<String, String>>,
    commit_count: usize,
    fail_writes: bool,
}

impl MockKvStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a committed entry directly (test fixture setup).
    pub fn insert(&mut self, namespace: &str, key: &str, value: &str) {
        for map in [&mut self.staged, &mut self.committed] {
            map.entry(namespace.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
        }
    }

    /// Committed value of `key`, if any.
    pub fn committed(&self, namespace: &str, key: &str) -> Option<&str> {
        self.committed
            .get(namespace)
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }

    /// Every committed `(key, value)` pair of `namespace`.
    pub fn committed_entries(&self, namespace: &str) -> Vec<(String, String)> {
        self.committed
            .get(namespace)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of commit calls performed.
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Make every subsequent `set`/`commit` fail.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl KvStore for MockKvStore {
    type Error = MockKvError;

    fn get<'b>(
        &self,
        namespace: &str,
        key: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<&'b str>, Self::Error> {
        let Some(value) = self.committed(namespace, key) else {
            return Ok(None);
        };
        let Some(dst) = buf.get_mut(..value.len()) else {
            return Ok(None);
        };
        dst.copy_from_slice(value.as_bytes());
        Ok(core::str::from_utf8(dst).ok())
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MockKvError);
        }
        self.staged
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn commit(&mut self, namespace: &str) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MockKvError);
        }
        let staged = self.staged.get(namespace).cloned().unwrap_or_default();
        self.committed.insert(namespace.to_string(), staged);
        self.commit_count += 1;
        Ok(())
    }

    fn for_each(
        &self,
        namespace: &str,
        visit: &mut dyn FnMut(&str, &str),
    ) -> Result<(), Self::Error> {
        if let Some(map) = self.committed.get(namespace) {
            for (k, v) in map {
                visit(k, v);
            }
        }
        Ok(())
    }
}
