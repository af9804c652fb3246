//! One-line RAM cache in front of the flash partition.
//!
//! UF2 payloads arrive 256 bytes at a time while flash erases whole
//! sectors. Writes are collected in a line of `N` bytes aligned to `N`; the
//! line is erased and programmed only when a write moves to another line or
//! on an explicit [`FlashCache::flush`], and not at all when flash already
//! holds the same bytes.

use embedded_storage::nor_flash::NorFlash;

/// Default line size: one ESP32 flash sector.
pub const DEFAULT_LINE: usize = 4096;

/// Chunk used to compare the cached line against flash.
const COMPARE_CHUNK: usize = 256;

/// Write-back cache of a single flash line.
pub struct FlashCache<const N: usize = DEFAULT_LINE> {
    line: [u8; N],
    base: Option<u32>,
}

struct LineCheck<F, const N: usize>(core::marker::PhantomData<F>);

impl<F: NorFlash, const N: usize> LineCheck<F, N> {
    const OK: () = assert!(
        N > 0 && N % F::ERASE_SIZE == 0 && N % F::WRITE_SIZE == 0,
        "cache line must be a multiple of the erase size"
    );
}

impl<const N: usize> FlashCache<N> {
    /// Empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            line: [0xFF; N],
            base: None,
        }
    }

    /// Offset of the cached line, if one is loaded.
    #[must_use]
    pub fn cached_line(&self) -> Option<u32> {
        self.base
    }

    // Safety: offset % N <= offset; N is a flash sector size.
    #[allow(clippy::cast_possible_truncation, clippy::arithmetic_side_effects)]
    fn line_base(offset: u32) -> u32 {
        offset - offset % N as u32
    }

    fn line_len<F: NorFlash>(flash: &F, base: u32) -> usize {
        let cap = flash.capacity();
        usize::try_from(base)
            .ok()
            .map_or(0, |b| cap.saturating_sub(b).min(N))
    }

    /// Stage `data` at partition `offset`, flushing the previous line when
    /// `data` belongs to another one.
    pub fn write<F: NorFlash>(
        &mut self,
        flash: &mut F,
        offset: u32,
        data: &[u8],
    ) -> Result<(), F::Error> {
        let () = LineCheck::<F, N>::OK;

        let mut offset = offset;
        let mut rest = data;
        while !rest.is_empty() {
            let base = Self::line_base(offset);
            if self.base != Some(base) {
                self.flush(flash)?;
                let len = Self::line_len(flash, base);
                if let Some(line) = self.line.get_mut(..len) {
                    flash.read(base, line)?;
                }
                self.base = Some(base);
            }

            // Safety: offset >= base, and the distance is below N.
            #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
            let at = (offset - base) as usize;
            let room = N.saturating_sub(at);
            let (now, later) = rest.split_at(rest.len().min(room));
            if let Some(dst) = self.line.get_mut(at..at.saturating_add(now.len())) {
                dst.copy_from_slice(now);
            }
            #[allow(clippy::cast_possible_truncation)] // now.len() <= N
            let advanced = now.len() as u32;
            offset = offset.saturating_add(advanced);
            rest = later;
        }
        Ok(())
    }

    /// Write the cached line out and invalidate it.
    ///
    /// Returns `true` when flash was erased and programmed, `false` when
    /// nothing was cached or flash already held the cached bytes. On error
    /// the line stays cached and a later flush retries it.
    pub fn flush<F: NorFlash>(&mut self, flash: &mut F) -> Result<bool, F::Error> {
        let Some(base) = self.base else {
            return Ok(false);
        };
        let len = Self::line_len(flash, base);
        let Some(line) = self.line.get(..len) else {
            self.base = None;
            return Ok(false);
        };

        if Self::matches(flash, base, line)? {
            log_debug!("flash line {} unchanged, skipping erase", base);
            self.base = None;
            return Ok(false);
        }

        #[allow(clippy::cast_possible_truncation)] // len <= N
        let end = base.saturating_add(len as u32);
        flash.erase(base, end)?;
        flash.write(base, line)?;
        log_debug!("flash line {} programmed", base);
        self.base = None;
        Ok(true)
    }

    fn matches<F: NorFlash>(flash: &mut F, base: u32, line: &[u8]) -> Result<bool, F::Error> {
        let mut live = [0u8; COMPARE_CHUNK];
        let mut at = base;
        for chunk in line.chunks(COMPARE_CHUNK) {
            let Some(live) = live.get_mut(..chunk.len()) else {
                return Ok(false);
            };
            flash.read(at, live)?;
            if live != chunk {
                return Ok(false);
            }
            #[allow(clippy::cast_possible_truncation)] // chunk.len() <= COMPARE_CHUNK
            let step = chunk.len() as u32;
            at = at.saturating_add(step);
        }
        Ok(true)
    }

    /// Read `buf.len()` bytes at `offset`, with pending cached bytes
    /// overlaid on the flash contents.
    pub fn read<F: NorFlash>(
        &self,
        flash: &mut F,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<(), F::Error> {
        flash.read(offset, buf)?;
        let Some(base) = self.base else {
            return Ok(());
        };
        let (Ok(offset), Ok(base)) = (usize::try_from(offset), usize::try_from(base)) else {
            return Ok(());
        };
        let start = offset.max(base);
        let end = offset
            .saturating_add(buf.len())
            .min(base.saturating_add(N));
        if start >= end {
            return Ok(());
        }
        // Safety: base <= start < end <= offset + buf.len() and end <= base + N.
        #[allow(clippy::arithmetic_side_effects)]
        let (dst, src) = (
            buf.get_mut(start - offset..end - offset),
            self.line.get(start - base..end - base),
        );
        if let (Some(dst), Some(src)) = (dst, src) {
            dst.copy_from_slice(src);
        }
        Ok(())
    }
}

impl<const N: usize> Default for FlashCache<N> {
    fn default() -> Self {
        Self::new()
    }
}
