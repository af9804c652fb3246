//! 3GPP TS 27.007 / V.250 command set on top of an [`AtChannel`].
//!
//! Each command is a request string, a timeout and a classifier. Classifiers
//! are pure functions over the accumulated response text and return `None`
//! while more data is needed.

use core::fmt::Write as _;

use embassy_time::Duration;
use heapless::String;

use crate::channel::AtChannel;
use crate::config::{COMMAND_TIMEOUT_DEFAULT, COMMAND_TIMEOUT_MODE_CHANGE};
use crate::error::AtError;
use crate::parser::EXIT_DATA_MODE;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// `+CSQ: <rssi>,<ber>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalQuality {
    /// Received signal strength indication, 0..=31, 99 = unknown.
    pub rssi: i32,
    /// Bit error rate, 0..=7, 99 = unknown.
    pub ber: i32,
}

/// `+CEREG: <n>,<stat>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistrationStatus {
    /// Unsolicited result code mode.
    pub n: i32,
    /// Registration state.
    pub stat: i32,
}

impl RegistrationStatus {
    /// Registered on the home network (1) or roaming (5).
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self.stat, 1 | 5)
    }
}

/// SIM state reported by `AT+CPIN?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
    /// No PIN required.
    Ready,
    /// Waiting for the SIM PIN.
    SimPin,
    /// Waiting for the SIM PUK.
    SimPuk,
    /// Waiting for the SIM PIN2.
    SimPin2,
    /// Waiting for the SIM PUK2.
    SimPuk2,
    /// Answer did not name a known state.
    Unknown,
}

/// How a dial (or data-mode resume) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DialOutcome {
    /// `CONNECT`: the port is now in data mode.
    Connected,
    /// `ERROR`
    Error,
    /// `NO CARRIER`
    NoCarrier,
    /// `BUSY`
    Busy,
    /// `NO ANSWER`
    NoAnswer,
}

/// One PDP context definition for `AT+CGDCONT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdpContext<'a> {
    /// Context identifier.
    pub cid: u8,
    /// PDP type, e.g. `"IP"`.
    pub pdp_type: &'a str,
    /// Access point name.
    pub apn: &'a str,
}

// ---------------------------------------------------------------------------
// Classifiers
// ---------------------------------------------------------------------------

/// Lines of `text`, without their terminators.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(str::trim)
}

fn has_ok(text: &str) -> bool {
    lines(text).any(|l| l == "OK")
}

fn has_error(text: &str) -> bool {
    lines(text).any(|l| l == "ERROR" || l.starts_with("+CME ERROR") || l.starts_with("+CMS ERROR"))
}

/// Offset of the terminal `OK` line in `text`.
fn ok_line_offset(text: &str) -> Option<usize> {
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if line.trim() == "OK" {
            return Some(offset);
        }
        offset = offset.saturating_add(line.len());
    }
    None
}

/// Leading (optionally signed) decimal integer of `s`, and the rest.
fn parse_int(s: &str) -> Option<(i32, &str)> {
    let digits_start = usize::from(s.starts_with('-') || s.starts_with('+'));
    let end = s
        .char_indices()
        .skip(digits_start)
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    if end <= digits_start {
        return None;
    }
    let (number, rest) = s.split_at(end);
    number.parse().ok().map(|n| (n, rest))
}

/// Two comma-separated integers at the start of `s`.
fn parse_pair(s: &str) -> Option<(i32, i32)> {
    let (a, rest) = parse_int(s)?;
    let rest = rest.strip_prefix(',')?;
    let (b, _) = parse_int(rest.trim_start())?;
    Some((a, b))
}

/// Status-only commands: `OK` or `ERROR`.
#[must_use]
pub fn classify_ok(text: &str) -> Option<Result<(), AtError>> {
    if has_ok(text) {
        Some(Ok(()))
    } else if has_error(text) {
        Some(Err(AtError::CommandFailed))
    } else {
        None
    }
}

/// Single-string commands: the text between an optional leading CRLF and
/// the `OK` line, without trailing line terminators.
#[must_use]
pub fn classify_string(text: &str) -> Option<Result<&str, AtError>> {
    if has_error(text) {
        return Some(Err(AtError::CommandFailed));
    }
    let body = text.strip_prefix("\r\n").unwrap_or(text);
    let end = ok_line_offset(body)?;
    let value = body.get(..end).unwrap_or_default();
    Some(Ok(value.trim_end_matches(['\r', '\n'])))
}

/// `+CSQ: <rssi>,<ber>` followed by `OK`.
#[must_use]
pub fn classify_csq(text: &str) -> Option<Result<SignalQuality, AtError>> {
    if has_error(text) {
        return Some(Err(AtError::CommandFailed));
    }
    if !has_ok(text) {
        return None;
    }
    let parsed = text.find("+CSQ").and_then(|at| {
        let after = text.get(at.saturating_add(4)..)?;
        let first_digit = after.find(|c: char| c.is_ascii_digit())?;
        parse_pair(after.get(first_digit..)?)
    });
    Some(
        parsed
            .map(|(rssi, ber)| SignalQuality { rssi, ber })
            .ok_or(AtError::Parse),
    )
}

/// `+CEREG: <n>,<stat>` followed by `OK`.
#[must_use]
pub fn classify_cereg(text: &str) -> Option<Result<RegistrationStatus, AtError>> {
    if has_error(text) {
        return Some(Err(AtError::CommandFailed));
    }
    if !has_ok(text) {
        return None;
    }
    let parsed = text.find("+CEREG:").and_then(|at| {
        let after = text.get(at.saturating_add(7)..)?.trim_start();
        parse_pair(after)
    });
    Some(
        parsed
            .map(|(n, stat)| RegistrationStatus { n, stat })
            .ok_or(AtError::Parse),
    )
}

/// `+CPIN: <code>` followed by `OK`.
///
/// The PIN2/PUK2 states are matched before PIN/PUK, which they contain.
#[must_use]
pub fn classify_pin(text: &str) -> Option<Result<PinState, AtError>> {
    if has_error(text) {
        return Some(Err(AtError::CommandFailed));
    }
    if !has_ok(text) {
        return None;
    }
    let state = if text.contains("READY") {
        PinState::Ready
    } else if text.contains("SIM PIN2") {
        PinState::SimPin2
    } else if text.contains("SIM PUK2") {
        PinState::SimPuk2
    } else if text.contains("SIM PIN") {
        PinState::SimPin
    } else if text.contains("SIM PUK") {
        PinState::SimPuk
    } else {
        PinState::Unknown
    };
    Some(Ok(state))
}

/// Dial / resume outcome. Every outcome is terminal and none is an error.
#[must_use]
pub fn classify_dial(text: &str) -> Option<DialOutcome> {
    let mut outcome = None;
    for line in lines(text) {
        let this = if line.starts_with("CONNECT") {
            DialOutcome::Connected
        } else if line == "ERROR" || line.starts_with("+CME ERROR") {
            DialOutcome::Error
        } else if line == "NO CARRIER" {
            DialOutcome::NoCarrier
        } else if line == "BUSY" {
            DialOutcome::Busy
        } else if line == "NO ANSWER" {
            DialOutcome::NoAnswer
        } else {
            continue;
        };
        if this == DialOutcome::Connected {
            return Some(this);
        }
        outcome.get_or_insert(this);
    }
    outcome
}

// ---------------------------------------------------------------------------
// Command runners
// ---------------------------------------------------------------------------

async fn run<C, T, K>(at: &C, command: &str, timeout: Duration, classify: K) -> Result<T, AtError>
where
    C: AtChannel,
    K: Fn(&str) -> Option<Result<T, AtError>>,
{
    let mut outcome = None;
    at.send_command(command, timeout, |text| match classify(text) {
        Some(result) => {
            outcome = Some(result);
            true
        }
        None => false,
    })
    .await?;
    let result = outcome.unwrap_or(Err(AtError::Parse));
    if result.is_err() {
        log_warn!("AT command {} failed", command);
    }
    result
}

async fn ok_command<C: AtChannel>(at: &C, command: &str) -> Result<(), AtError> {
    run(at, command, COMMAND_TIMEOUT_DEFAULT, classify_ok).await
}

/// Copy `src` into `dst`, truncating at a char boundary if it does not fit.
fn copy_truncated<const N: usize>(src: &str, dst: &mut String<N>) -> Result<(), AtError> {
    dst.clear();
    let mut end = src.len().min(N);
    while !src.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    if end < src.len() {
        log_warn!("response of {} bytes truncated to {}", src.len(), end);
    }
    dst.push_str(src.get(..end).unwrap_or_default())
        .map_err(|_| AtError::InvalidSize)
}

async fn string_command<C: AtChannel, const N: usize>(
    at: &C,
    command: &str,
) -> Result<String<N>, AtError> {
    let mut value = String::new();
    let mut outcome = None;
    at.send_command(command, COMMAND_TIMEOUT_DEFAULT, |text| {
        match classify_string(text) {
            Some(Ok(s)) => {
                outcome = Some(copy_truncated(s, &mut value));
                true
            }
            Some(Err(e)) => {
                outcome = Some(Err(e));
                true
            }
            None => false,
        }
    })
    .await?;
    outcome.unwrap_or(Err(AtError::Parse))?;
    Ok(value)
}

/// `AT`: liveness check.
pub async fn at<C: AtChannel>(at: &C) -> Result<(), AtError> {
    ok_command(at, "AT").await
}

/// `ATE1` / `ATE0`: command echo on or off.
pub async fn set_echo<C: AtChannel>(at: &C, on: bool) -> Result<(), AtError> {
    ok_command(at, if on { "ATE1" } else { "ATE0" }).await
}

/// `AT+CGMI`: manufacturer identification.
pub async fn manufacturer_id<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+CGMI").await
}

/// `AT+CGMM`: model identification.
pub async fn module_id<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+CGMM").await
}

/// `AT+CGMR`: revision identification.
pub async fn revision_id<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+CGMR").await
}

/// `AT+CGSN`: IMEI.
pub async fn imei<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+CGSN").await
}

/// `AT+CIMI`: IMSI.
pub async fn imsi<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+CIMI").await
}

/// `AT+COPS?`: current operator, raw `+COPS:` answer.
pub async fn operator_name<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+COPS?").await
}

/// `AT+CGDCONT?`: defined PDP contexts, raw answer.
pub async fn pdp_context<C: AtChannel, const N: usize>(at: &C) -> Result<String<N>, AtError> {
    string_command(at, "AT+CGDCONT?").await
}

/// `AT+CEREG?`: EPS network registration status.
pub async fn network_registration<C: AtChannel>(at: &C) -> Result<RegistrationStatus, AtError> {
    run(at, "AT+CEREG?", COMMAND_TIMEOUT_DEFAULT, classify_cereg).await
}

/// `AT+CPIN?`: SIM state.
pub async fn read_pin<C: AtChannel>(at: &C) -> Result<PinState, AtError> {
    run(at, "AT+CPIN?", COMMAND_TIMEOUT_DEFAULT, classify_pin).await
}

/// `AT+CPIN=<pin>`: unlock the SIM. `pin` must be exactly four characters.
pub async fn set_pin<C: AtChannel>(at: &C, pin: &str) -> Result<(), AtError> {
    if pin.len() != 4 {
        log_error!("PIN must be 4 digits");
        return Err(AtError::InvalidArg);
    }
    let mut command: String<16> = String::new();
    write!(command, "AT+CPIN={}", pin).map_err(|_| AtError::InvalidArg)?;
    ok_command(at, &command).await
}

/// `AT&W`: store the active profile.
pub async fn store_profile<C: AtChannel>(at: &C) -> Result<(), AtError> {
    ok_command(at, "AT&W").await
}

/// `AT+CGDCONT=<cid>,"<type>","<apn>"`: define a PDP context.
pub async fn set_pdp_context<C: AtChannel>(at: &C, pdp: &PdpContext<'_>) -> Result<(), AtError> {
    let mut command: String<128> = String::new();
    write!(
        command,
        "AT+CGDCONT={},\"{}\",\"{}\"",
        pdp.cid, pdp.pdp_type, pdp.apn
    )
    .map_err(|_| AtError::InvalidArg)?;
    ok_command(at, &command).await
}

/// `AT+CSQ`: signal quality.
pub async fn signal_quality<C: AtChannel>(at: &C) -> Result<SignalQuality, AtError> {
    run(at, "AT+CSQ", COMMAND_TIMEOUT_DEFAULT, classify_csq).await
}

/// `ATD*99***1#`: dial the packet data service.
pub async fn dial<C: AtChannel>(at: &C) -> Result<DialOutcome, AtError> {
    run(at, "ATD*99***1#", COMMAND_TIMEOUT_MODE_CHANGE, |t| {
        classify_dial(t).map(Ok)
    })
    .await
}

/// `ATO`: return to an established data session.
pub async fn resume_data_mode<C: AtChannel>(at: &C) -> Result<DialOutcome, AtError> {
    run(at, "ATO", COMMAND_TIMEOUT_MODE_CHANGE, |t| classify_dial(t).map(Ok)).await
}

/// `ATH`: hang up.
pub async fn hang_up<C: AtChannel>(at: &C) -> Result<(), AtError> {
    ok_command(at, "ATH").await
}

/// `+++`: leave data mode (sent without terminator).
pub async fn exit_data_mode<C: AtChannel>(at: &C) -> Result<(), AtError> {
    ok_command(at, EXIT_DATA_MODE).await
}
