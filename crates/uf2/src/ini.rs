//! CONFIG.INI: one NVS namespace rendered as INI text and parsed back.
//!
//! ```text
//! [uf2_nvs]
//! ssid = my-network
//! password = ****
//! ```
//!
//! Values are strings. A value that would not read back unchanged from a
//! bare `key = value` line (surrounding whitespace, a leading `"` or `;`,
//! an inline-comment marker) is rendered in double quotes. Masked values
//! are rendered as `****` and never written back while they still read
//! `****`. Values holding line breaks are not supported.

use core::fmt::Write as _;

use heapless::String;
use platform::KvStore;

use crate::error::DiskError;

/// Capacity of the INI text; CONFIG.INI occupies exactly this much.
pub const INI_CAPACITY: usize = 512;

/// Placeholder rendered for hidden values.
pub const MASK: &str = "****";

/// Which values are hidden in the rendered text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Masking<'a> {
    /// Hide every value.
    pub hide_all: bool,
    /// Hide these keys.
    pub hidden_keys: &'a [&'a str],
}

impl Masking<'_> {
    /// Whether the value of `key` is rendered as [`MASK`].
    #[must_use]
    pub fn hides(&self, key: &str) -> bool {
        self.hide_all || self.hidden_keys.contains(&key)
    }
}

/// Render `namespace` into `out`.
///
/// On [`DiskError::IniTooLarge`] `out` holds every line that fit.
pub fn render<S: KvStore>(
    kv: &S,
    namespace: &str,
    masking: Masking<'_>,
    out: &mut String<INI_CAPACITY>,
) -> Result<(), DiskError> {
    out.clear();
    if write!(out, "[{namespace}]\r\n").is_err() {
        out.clear();
        return Err(DiskError::IniTooLarge);
    }

    let mut overflow = false;
    kv.for_each(namespace, &mut |key, value| {
        if overflow {
            return;
        }
        let value = if masking.hides(key) { MASK } else { value };
        let mark = out.len();
        let line = if needs_quotes(value) {
            write!(out, "{key} = \"{value}\"\r\n")
        } else {
            write!(out, "{key} = {value}\r\n")
        };
        if line.is_err() {
            out.truncate(mark);
            overflow = true;
        }
    })
    .map_err(|_| {
        log_error!("failed to list NVS namespace");
        DiskError::Storage
    })?;

    if overflow {
        log_warn!("CONFIG.INI truncated");
        return Err(DiskError::IniTooLarge);
    }
    Ok(())
}

/// `key = value` pairs of an INI text, in order.
///
/// Blank lines, `;`/`#` comments, section headers and lines without `=`
/// are skipped. Keys and values are trimmed; a `;` preceded by whitespace
/// starts an inline comment. A value opening with `"` is taken verbatim up
/// to its last `"` when only a comment follows.
pub struct IniLines<'a> {
    lines: core::str::Lines<'a>,
}

impl<'a> IniLines<'a> {
    /// Iterate over the pairs of `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
        }
    }
}

impl<'a> Iterator for IniLines<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() || line.starts_with([';', '#', '[']) {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            return Some((key, parse_value(value)));
        }
        None
    }
}

fn parse_value(raw: &str) -> &str {
    let quoted = raw
        .trim_start()
        .strip_prefix('"')
        .and_then(|body| body.rsplit_once('"'));
    if let Some((inner, rest)) = quoted {
        let rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with(';') {
            return inner;
        }
    }
    strip_inline_comment(raw).trim()
}

fn needs_quotes(value: &str) -> bool {
    value.starts_with(['"', ';'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || strip_inline_comment(value).len() != value.len()
}

fn strip_inline_comment(value: &str) -> &str {
    value
        .as_bytes()
        .windows(2)
        .position(|w| matches!(w, [b' ' | b'\t', b';']))
        .and_then(|at| value.get(..at))
        .unwrap_or(value)
}

/// Write every changed pair of `text` into `namespace`, one commit per key.
///
/// Pairs whose value equals the stored one are skipped, as are masked
/// values of hidden keys. Returns the number of keys written.
pub fn commit<S: KvStore>(
    kv: &mut S,
    namespace: &str,
    text: &str,
    masking: Masking<'_>,
) -> Result<usize, DiskError> {
    let mut written = 0usize;
    let mut failed = false;
    let mut current = [0u8; INI_CAPACITY];

    for (key, value) in IniLines::new(text) {
        if value == MASK && masking.hides(key) {
            continue;
        }
        if matches!(kv.get(namespace, key, &mut current), Ok(Some(v)) if v == value) {
            continue;
        }
        match kv.set(namespace, key, value).and_then(|()| kv.commit(namespace)) {
            Ok(()) => {
                log_info!("NVS {} updated", key);
                written = written.saturating_add(1);
            }
            Err(_) => {
                log_error!("failed to write NVS key {}", key);
                failed = true;
            }
        }
    }

    if failed {
        Err(DiskError::Storage)
    } else {
        Ok(written)
    }
}
