//! AT engine error type.

use thiserror_no_std::Error;

/// Failure of an AT operation.
///
/// After `NotFinished` the command's effect on the modem is unknown; after
/// `Timeout` the modem never produced a terminal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtError {
    /// No terminal response within the command timeout.
    #[error("command timed out")]
    Timeout,
    /// Parser stopped, busy, idle when data was expected, or its receive
    /// buffer failed the integrity check.
    #[error("parser in invalid state")]
    InvalidState,
    /// Argument rejected before anything was sent (e.g. command too long).
    #[error("invalid argument")]
    InvalidArg,
    /// Receive buffer would overflow.
    #[error("response does not fit the receive buffer")]
    InvalidSize,
    /// The parser was stopped while the command was outstanding.
    #[error("command not finished, parser stopped")]
    NotFinished,
    /// The transport failed to send the command.
    #[error("transport error")]
    Transport,
    /// The modem answered `ERROR` (or another failure outcome).
    #[error("modem reported failure")]
    CommandFailed,
    /// The response was terminal but its payload could not be parsed.
    #[error("malformed response")]
    Parse,
}
