//! Modem engine configuration: timeouts, retry policy, readiness thresholds.

use embassy_time::Duration;

/// Timeout for ordinary query/set commands.
pub const COMMAND_TIMEOUT_DEFAULT: Duration = Duration::from_millis(500);

/// Timeout for commands that switch the port into data mode (`ATD`, `ATO`).
pub const COMMAND_TIMEOUT_MODE_CHANGE: Duration = Duration::from_millis(5000);

/// Parser options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtConfig {
    /// Drop the first CRLF-terminated line (the command echo) before the
    /// line handler sees the response.
    pub skip_first_line: bool,
}

/// Fixed-count, fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// Conditions the modem must meet before dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Signal strength (`+CSQ` rssi) must be strictly above this value.
    pub rssi_threshold: i32,
    /// Retry policy applied to each individual check.
    pub retry: RetryPolicy,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            rssi_threshold: 10,
            retry: RetryPolicy::default(),
        }
    }
}
