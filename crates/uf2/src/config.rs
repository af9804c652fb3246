//! Board identity served on the virtual drive.

use core::fmt;

use crate::ini::Masking;

/// Build timestamp shown in INFO_UF2.TXT and stamped on directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BuildDate {
    pub year: u16,
    /// 1..=12
    pub month: u8,
    /// 1..=31
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl BuildDate {
    /// FAT date: bits 15..9 year since 1980, 8..5 month, 4..0 day.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: every field is masked to its bit width
    pub fn dos_date(&self) -> u16 {
        let year = self.year.saturating_sub(1980).min(127);
        (year << 9) | (u16::from(self.month & 0x0F) << 5) | u16::from(self.day & 0x1F)
    }

    /// FAT time: bits 15..11 hours, 10..5 minutes, 4..0 seconds / 2.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: every field is masked to its bit width
    pub fn dos_time(&self) -> u16 {
        (u16::from(self.hour & 0x1F) << 11)
            | (u16::from(self.minute & 0x3F) << 5)
            | u16::from((self.second / 2) & 0x1F)
    }

    /// Creation time in 10 ms units, carrying the odd second.
    #[must_use]
    pub fn dos_time_fine(&self) -> u8 {
        if self.second % 2 == 1 {
            100
        } else {
            0
        }
    }
}

impl fmt::Display for BuildDate {
    /// `Mmm dd yyyy`, the layout of C's `__DATE__`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let month = usize::from(self.month.saturating_sub(1))
            .min(MONTHS.len().saturating_sub(1));
        let name = MONTHS.get(month).copied().unwrap_or("???");
        write!(f, "{name} {:2} {}", self.day, self.year)
    }
}

/// Runtime description of the board behind the drive.
#[derive(Debug, Clone, Copy)]
pub struct BoardConfig {
    /// FAT volume label, at most 11 characters.
    pub volume_label: &'static str,
    /// Application name shown in INFO_UF2.TXT.
    pub app_name: &'static str,
    /// Application version shown in INFO_UF2.TXT.
    pub app_version: &'static str,
    /// SDK version shown in INFO_UF2.TXT.
    pub sdk_version: &'static str,
    /// `Model:` line of INFO_UF2.TXT.
    pub model: &'static str,
    /// `Board-ID:` line of INFO_UF2.TXT.
    pub board_id: &'static str,
    /// Timestamp of every directory entry.
    pub build_date: BuildDate,
    /// Target of the INDEX.HTM redirect.
    pub index_url: &'static str,
    /// UF2 family accepted for flashing and stamped on CURRENT.UF2.
    pub family_id: u32,
    /// Address of partition offset 0 as seen in UF2 `target_addr`.
    pub app_start: u32,
    /// Adds AUTORUN.INF and FAVICON.ICO when set.
    pub favicon: Option<&'static [u8]>,
    /// Namespace exposed as CONFIG.INI.
    pub nvs_namespace: &'static str,
    /// Render every value as `****`.
    pub hide_all: bool,
    /// Keys rendered as `****`.
    pub hidden_keys: &'static [&'static str],
    /// Treat non-UF2 writes starting with `[` that land in CURRENT.UF2 as
    /// CONFIG.INI writes. Linux with wear levelling relocates file data.
    pub redirect_stray_ini_writes: bool,
}

impl BoardConfig {
    /// Value masking for CONFIG.INI.
    #[must_use]
    pub fn masking(&self) -> Masking<'static> {
        Masking {
            hide_all: self.hide_all,
            hidden_keys: self.hidden_keys,
        }
    }
}

impl Default for BoardConfig {
    /// ESP32-S3 with the application partition at 0x10000.
    fn default() -> Self {
        Self {
            volume_label: "ESP32S3-UF2",
            app_name: platform::config::APP_NAME,
            app_version: platform::config::APP_VERSION,
            sdk_version: "v5.1",
            model: "ESP32-S3",
            board_id: "ESP32S3-DevKit",
            build_date: BuildDate {
                year: 2024,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
                second: 0,
            },
            index_url: "https://github.com/espressif",
            family_id: 0xc47e_5767,
            app_start: 0x0001_0000,
            favicon: None,
            nvs_namespace: platform::config::DEFAULT_NVS_NAMESPACE,
            hide_all: false,
            hidden_keys: &[],
            redirect_stray_ini_writes: true,
        }
    }
}
