//! Command channel seam between the command layer and the parser.

use embassy_time::Duration;

use crate::error::AtError;

/// Anything that can run one AT command to completion.
///
/// Implemented by [`crate::AtParser`]; the command layer and the DTE flow
/// are generic over it so they can be driven by a scripted channel in tests.
pub trait AtChannel {
    /// Send `command` and feed the accumulated response to `handler` until
    /// it returns `true`.
    fn send_command<F>(
        &self,
        command: &str,
        timeout: Duration,
        handler: F,
    ) -> impl core::future::Future<Output = Result<(), AtError>>
    where
        F: FnMut(&str) -> bool;
}
