//! AT command parser: single outstanding command, chunked response assembly.
//!
//! Two contexts meet here:
//!
//! ```text
//!  caller task                         receive task (UART / USB-CDC)
//!  ───────────                         ─────────────────────────────
//!  send_command()                      with_response_buffer() + write_response_done()
//!    lock link (command lock)            (or feed())
//!    Idle → Processing                     append to rx buffer
//!    transport.send()                      buffer ends in "\r\n"? → signal
//!    wait signal / timeout / stop
//!      run line handler on rx buffer
//!    Processing → Idle (drop guard)
//! ```
//!
//! The receive side never takes the command lock; it only touches the
//! receive buffer under a short blocking critical section and raises a
//! [`Signal`]. The line handler is borrowed by the waiting `send_command`
//! future and is run there, against the whole accumulated buffer, each time
//! the buffer ends on a line boundary.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use heapless::{String, Vec};
use platform::Transport;

use crate::channel::AtChannel;
use crate::config::AtConfig;
use crate::error::AtError;

/// Integrity marker stored directly behind the receive buffer.
const END_MARKER: u32 = 0x5A12_21A5;

/// Escape sequence that leaves data mode; sent without a terminator.
pub const EXIT_DATA_MODE: &str = "+++";

/// Room the send buffer keeps for `"\r\n"` plus one spare byte.
const SEND_RESERVE: usize = 3;

/// Smallest buffer either side may be configured with.
pub const MIN_BUFFER_LEN: usize = 32;

/// Processing state of the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParserState {
    /// No command outstanding.
    Idle,
    /// A command has been sent and its response is being collected.
    Processing,
}

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

struct RxState<const TX: usize, const RX: usize> {
    state: ParserState,
    stopped: bool,
    received: usize,
    buf: [u8; RX],
    end_marker: u32,
    /// Copy of the outstanding command, for logs and `current_command`.
    command: String<TX>,
}

impl<const TX: usize, const RX: usize> RxState<TX, RX> {
    const fn new() -> Self {
        Self {
            state: ParserState::Idle,
            stopped: true,
            received: 0,
            buf: [0; RX],
            end_marker: END_MARKER,
            command: String::new(),
        }
    }

    /// Account for `write_len` new bytes. Returns the outcome and whether the
    /// waiting command must be woken.
    fn accept(&mut self, write_len: usize) -> (Result<(), AtError>, bool) {
        if self.stopped {
            log_warn!("AT parser is stopped, dropping {} bytes", write_len);
            return (Err(AtError::InvalidState), false);
        }
        if self.end_marker != END_MARKER {
            log_error!("AT parser buffer is corrupted, force stop");
            self.stopped = true;
            return (Err(AtError::InvalidState), true);
        }
        let Some(total) = self.received.checked_add(write_len).filter(|t| *t <= RX) else {
            log_error!("AT parser buffer is full ({} + {} > {})", self.received, write_len, RX);
            return (Err(AtError::InvalidSize), false);
        };
        self.received = total;

        if !self.ends_on_line() {
            return (Ok(()), false);
        }
        if self.state == ParserState::Idle {
            log_warn!("no command outstanding, discarding {} bytes", total);
            self.received = 0;
            return (Err(AtError::InvalidState), false);
        }
        (Ok(()), true)
    }

    /// More than a bare terminator has arrived and the buffer ends in CRLF.
    fn ends_on_line(&self) -> bool {
        self.received > 4 && self.valid().ends_with(b"\r\n")
    }

    fn valid(&self) -> &[u8] {
        self.buf.get(..self.received).unwrap_or_default()
    }

    /// Text the line handler sees: the valid UTF-8 prefix of the buffer,
    /// optionally without the echoed command line.
    fn lines(&self, skip_first_line: bool) -> &str {
        let bytes = self.valid();
        let text = match core::str::from_utf8(bytes) {
            Ok(text) => text,
            // valid_up_to() always lands on a char boundary
            Err(e) => core::str::from_utf8(bytes.get(..e.valid_up_to()).unwrap_or_default())
                .unwrap_or_default(),
        };
        if !skip_first_line {
            return text;
        }
        text.split_once("\r\n").map_or(text, |(_, rest)| rest)
    }

    fn finish(&mut self) {
        self.state = ParserState::Idle;
        self.received = 0;
        self.command.clear();
    }
}

// ---------------------------------------------------------------------------
// Send side
// ---------------------------------------------------------------------------

struct Link<T, const TX: usize> {
    transport: T,
    send_buf: Vec<u8, TX>,
}

/// Returns the parser to Idle on every exit path of `send_command`.
struct CommandGuard<'a, M: RawMutex, const TX: usize, const RX: usize> {
    rx: &'a BlockingMutex<M, RefCell<RxState<TX, RX>>>,
    event: &'a Signal<M, ()>,
}

impl<M: RawMutex, const TX: usize, const RX: usize> Drop for CommandGuard<'_, M, TX, RX> {
    fn drop(&mut self) {
        self.rx.lock(|rx| rx.borrow_mut().finish());
        self.event.reset();
    }
}

/// AT command engine bound to one transport.
///
/// `TX` and `RX` are the send and receive buffer sizes; both must exceed
/// [`MIN_BUFFER_LEN`]. A new parser is *stopped*: call [`AtParser::start`]
/// before the first command.
pub struct AtParser<M: RawMutex, T: Transport, const TX: usize, const RX: usize> {
    config: AtConfig,
    link: Mutex<M, Link<T, TX>>,
    rx: BlockingMutex<M, RefCell<RxState<TX, RX>>>,
    event: Signal<M, ()>,
}

impl<M: RawMutex, T: Transport, const TX: usize, const RX: usize> AtParser<M, T, TX, RX> {
    const BUFFERS_OK: () = assert!(
        TX > MIN_BUFFER_LEN && RX > MIN_BUFFER_LEN,
        "AT parser buffers must exceed 32 bytes"
    );

    /// Create a stopped parser that sends through `transport`.
    pub fn new(transport: T, config: AtConfig) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::BUFFERS_OK;
        Self {
            config,
            link: Mutex::new(Link {
                transport,
                send_buf: Vec::new(),
            }),
            rx: BlockingMutex::new(RefCell::new(RxState::new())),
            event: Signal::new(),
        }
    }

    /// Allow commands and response data.
    pub fn start(&self) {
        self.rx.lock(|rx| rx.borrow_mut().stopped = false);
        log_debug!("AT parser started");
    }

    /// Reject new commands and response data; an outstanding command
    /// returns [`AtError::NotFinished`].
    pub fn stop(&self) {
        self.rx.lock(|rx| rx.borrow_mut().stopped = true);
        self.event.signal(());
        log_debug!("AT parser stopped");
    }

    /// Whether the parser is stopped.
    pub fn is_stopped(&self) -> bool {
        self.rx.lock(|rx| rx.borrow().stopped)
    }

    /// Current processing state.
    pub fn state(&self) -> ParserState {
        self.rx.lock(|rx| rx.borrow().state)
    }

    /// The outstanding command (without terminator), if any.
    pub fn current_command(&self) -> Option<String<TX>> {
        self.rx.lock(|rx| {
            let rx = rx.borrow();
            (rx.state == ParserState::Processing).then(|| rx.command.clone())
        })
    }

    /// Send `command` and wait until `handler` accepts the response.
    ///
    /// `handler` receives the whole response accumulated so far each time it
    /// ends on a line boundary, and returns `true` once it has seen a
    /// terminal result. Commands other than `+++` get a `"\r\n"` terminator.
    ///
    /// Concurrent callers are served one at a time.
    pub async fn send_command<F>(
        &self,
        command: &str,
        timeout: Duration,
        mut handler: F,
    ) -> Result<(), AtError>
    where
        F: FnMut(&str) -> bool,
    {
        let mut link = self.link.lock().await;

        self.rx.lock(|rx| {
            let rx = rx.borrow();
            if rx.state != ParserState::Idle {
                log_warn!("AT parser is not idle");
                return Err(AtError::InvalidState);
            }
            if rx.stopped {
                log_warn!("AT parser is stopped, not sending {}", command);
                return Err(AtError::InvalidState);
            }
            Ok(())
        })?;
        if command.len() >= TX.saturating_sub(SEND_RESERVE) {
            log_error!("command is too long ({} bytes)", command.len());
            return Err(AtError::InvalidArg);
        }

        let Link {
            transport,
            send_buf,
        } = &mut *link;
        send_buf.clear();
        send_buf
            .extend_from_slice(command.as_bytes())
            .map_err(|_| AtError::InvalidArg)?;
        if command != EXIT_DATA_MODE {
            send_buf
                .extend_from_slice(b"\r\n")
                .map_err(|_| AtError::InvalidArg)?;
        }

        self.rx.lock(|rx| {
            let mut rx = rx.borrow_mut();
            rx.command.clear();
            rx.command
                .push_str(command)
                .map_err(|_| AtError::InvalidSize)?;
            rx.state = ParserState::Processing;
            rx.received = 0;
            Ok::<(), AtError>(())
        })?;
        self.event.reset();
        let _guard = CommandGuard {
            rx: &self.rx,
            event: &self.event,
        };

        transport.send(send_buf.as_slice()).await.map_err(|_| {
            log_error!("failed to send command {}", command);
            AtError::Transport
        })?;
        log_debug!("sent {}", command);

        let skip_first_line = self.config.skip_first_line;
        let response = async {
            loop {
                if self.is_stopped() {
                    return Err(AtError::NotFinished);
                }
                let done = self.rx.lock(|rx| {
                    let rx = rx.borrow();
                    rx.ends_on_line() && handler(rx.lines(skip_first_line))
                });
                if done {
                    return Ok(());
                }
                self.event.wait().await;
            }
        };

        match with_timeout(timeout, response).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                log_warn!("command {} not finished, parser stopped", command);
                Err(e)
            }
            Err(_) => {
                log_warn!("command {} response timeout", command);
                Err(AtError::Timeout)
            }
        }
    }

    /// Give `fill` the unwritten tail of the receive buffer.
    ///
    /// Report how many bytes were written with
    /// [`AtParser::write_response_done`].
    pub fn with_response_buffer<R>(&self, fill: impl FnOnce(&mut [u8]) -> R) -> R {
        self.rx.lock(|rx| {
            let mut rx = rx.borrow_mut();
            let start = rx.received;
            match rx.buf.get_mut(start..) {
                Some(tail) => fill(tail),
                None => fill(&mut []),
            }
        })
    }

    /// Commit `write_len` bytes deposited through
    /// [`AtParser::with_response_buffer`].
    ///
    /// # Errors
    ///
    /// - [`AtError::InvalidState`] if the parser is stopped, if the buffer
    ///   failed its integrity check (the parser is then stopped), or if a
    ///   complete line arrived while no command is outstanding (the data is
    ///   discarded).
    /// - [`AtError::InvalidSize`] if the bytes do not fit; nothing is
    ///   committed.
    pub fn write_response_done(&self, write_len: usize) -> Result<(), AtError> {
        let (result, wake) = self.rx.lock(|rx| rx.borrow_mut().accept(write_len));
        if wake {
            self.event.signal(());
        }
        result
    }

    /// Copy `bytes` into the receive buffer and commit them.
    pub fn feed(&self, bytes: &[u8]) -> Result<(), AtError> {
        let copied = self.with_response_buffer(|tail| match tail.get_mut(..bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        });
        if !copied {
            log_error!("AT parser buffer is full, {} bytes rejected", bytes.len());
            return Err(AtError::InvalidSize);
        }
        self.write_response_done(bytes.len())
    }

    /// Discard everything received so far.
    pub fn flush(&self) {
        self.rx.lock(|rx| rx.borrow_mut().received = 0);
    }

    /// Take the transport back. Only a stopped parser can be dismantled.
    #[allow(clippy::result_large_err)]
    pub fn into_transport(self) -> Result<T, Self> {
        if !self.is_stopped() {
            log_warn!("AT parser is not stopped");
            return Err(self);
        }
        Ok(self.link.into_inner().transport)
    }

    #[cfg(test)]
    fn corrupt_end_marker(&self) {
        self.rx.lock(|rx| rx.borrow_mut().end_marker = 0);
    }
}

impl<M: RawMutex, T: Transport, const TX: usize, const RX: usize> AtChannel
    for AtParser<M, T, TX, RX>
{
    async fn send_command<F>(&self, command: &str, timeout: Duration, handler: F) -> Result<(), AtError>
    where
        F: FnMut(&str) -> bool,
    {
        AtParser::send_command(self, command, timeout, handler).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use embassy_futures::join::join;
    use embassy_futures::yield_now;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use platform::mocks::MockTransport;

    type TestParser = AtParser<NoopRawMutex, MockTransport, 64, 128>;

    fn started(config: AtConfig) -> (TestParser, platform::mocks::SentLog) {
        let transport = MockTransport::new();
        let log = transport.log();
        let parser = TestParser::new(transport, config);
        parser.start();
        (parser, log)
    }

    fn ok_seen(text: &str) -> bool {
        text.contains("OK")
    }

    #[test]
    fn test_new_parser_is_stopped_and_idle() {
        let parser = TestParser::new(MockTransport::new(), AtConfig::default());
        assert!(parser.is_stopped());
        assert_eq!(parser.state(), ParserState::Idle);
        assert_eq!(parser.current_command(), None);
    }

    #[tokio::test]
    async fn test_send_while_stopped_is_rejected() {
        let transport = MockTransport::new();
        let log = transport.log();
        let parser = TestParser::new(transport, AtConfig::default());

        let res = parser
            .send_command("AT", Duration::from_millis(100), ok_seen)
            .await;
        assert_eq!(res, Err(AtError::InvalidState));
        assert!(log.sent().is_empty());
    }

    #[tokio::test]
    async fn test_command_gets_crlf_and_completes() {
        let (parser, log) = started(AtConfig::default());

        let (res, ()) = join(
            parser.send_command("AT", Duration::from_secs(1), ok_seen),
            async {
                yield_now().await;
                assert_eq!(parser.current_command().unwrap().as_str(), "AT");
                parser.feed(b"\r\nOK\r\n").unwrap();
            },
        )
        .await;

        assert_eq!(res, Ok(()));
        assert_eq!(log.sent(), vec![b"AT\r\n".to_vec()]);
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[tokio::test]
    async fn test_escape_sequence_sent_raw() {
        let (parser, log) = started(AtConfig::default());

        let (res, ()) = join(
            parser.send_command(EXIT_DATA_MODE, Duration::from_secs(1), ok_seen),
            async {
                yield_now().await;
                parser.feed(b"\r\nOK\r\n").unwrap();
            },
        )
        .await;

        assert_eq!(res, Ok(()));
        assert_eq!(log.sent(), vec![b"+++".to_vec()]);
    }

    #[tokio::test]
    async fn test_too_long_command_is_invalid_arg() {
        let (parser, log) = started(AtConfig::default());
        let long = "A".repeat(61);

        let res = parser
            .send_command(&long, Duration::from_millis(100), ok_seen)
            .await;
        assert_eq!(res, Err(AtError::InvalidArg));
        assert!(log.sent().is_empty());
    }

    #[tokio::test]
    async fn test_echo_line_is_skipped() {
        let (parser, _log) = started(AtConfig {
            skip_first_line: true,
        });
        let mut seen = std::string::String::new();

        let (res, ()) = join(
            parser.send_command("AT+CGMI", Duration::from_secs(1), |text| {
                seen = text.to_string();
                text.contains("OK")
            }),
            async {
                yield_now().await;
                parser.feed(b"AT+CGMI\r\nQuectel\r\nOK\r\n").unwrap();
            },
        )
        .await;

        assert_eq!(res, Ok(()));
        assert_eq!(seen, "Quectel\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_no_response_times_out() {
        let (parser, _log) = started(AtConfig::default());

        let res = parser
            .send_command("AT", Duration::from_millis(20), ok_seen)
            .await;
        assert_eq!(res, Err(AtError::Timeout));
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[tokio::test]
    async fn test_stop_during_command_is_not_finished() {
        let (parser, _log) = started(AtConfig::default());

        let (res, ()) = join(
            parser.send_command("AT", Duration::from_secs(5), ok_seen),
            async {
                yield_now().await;
                parser.stop();
            },
        )
        .await;

        assert_eq!(res, Err(AtError::NotFinished));
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn test_idle_line_is_discarded() {
        let (parser, _log) = started(AtConfig::default());

        assert_eq!(parser.feed(b"\r\n+CEREG: 1\r\n"), Err(AtError::InvalidState));
        // Buffer was emptied, so the full capacity is free again.
        let free = parser.with_response_buffer(|tail| tail.len());
        assert_eq!(free, 128);
    }

    #[test]
    fn test_partial_idle_data_is_kept() {
        let (parser, _log) = started(AtConfig::default());

        assert_eq!(parser.feed(b"+CEREG"), Ok(()));
        let free = parser.with_response_buffer(|tail| tail.len());
        assert_eq!(free, 128 - 6);

        parser.flush();
        assert_eq!(parser.with_response_buffer(|tail| tail.len()), 128);
    }

    #[test]
    fn test_overflow_is_invalid_size() {
        let (parser, _log) = started(AtConfig::default());

        assert_eq!(parser.feed(&[b'x'; 100]), Ok(()));
        assert_eq!(parser.feed(&[b'y'; 29]), Err(AtError::InvalidSize));
        assert_eq!(parser.write_response_done(29), Err(AtError::InvalidSize));
        // Parser keeps running.
        assert!(!parser.is_stopped());
        assert_eq!(parser.feed(&[b'z'; 28]), Ok(()));
    }

    #[test]
    fn test_corruption_forces_stop() {
        let (parser, _log) = started(AtConfig::default());
        parser.corrupt_end_marker();

        assert_eq!(parser.write_response_done(1), Err(AtError::InvalidState));
        assert!(parser.is_stopped());
    }

    #[test]
    fn test_data_while_stopped_is_rejected() {
        let parser = TestParser::new(MockTransport::new(), AtConfig::default());
        assert_eq!(parser.feed(b"OK\r\n"), Err(AtError::InvalidState));
    }

    #[test]
    fn test_into_transport_requires_stop() {
        let (parser, _log) = started(AtConfig::default());

        let parser = parser.into_transport().err().expect("running parser kept");
        parser.stop();
        assert!(parser.into_transport().is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_returns_idle() {
        let parser = TestParser::new(MockTransport::failing(), AtConfig::default());
        parser.start();

        let res = parser
            .send_command("AT", Duration::from_millis(100), ok_seen)
            .await;
        assert_eq!(res, Err(AtError::Transport));
        assert_eq!(parser.state(), ParserState::Idle);
    }
}
