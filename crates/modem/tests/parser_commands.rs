//! End-to-end tests: command layer on a real parser fed by a scripted modem.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use embassy_futures::join::{join, join3};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_time::Duration;
use modem::commands::{self, PinState, SignalQuality};
use modem::{pump, AtConfig, AtError, AtParser, PumpExit};
use platform::mocks::{ChunkedReader, MockTransport};

type Parser = AtParser<NoopRawMutex, MockTransport, 128, 256>;

fn started() -> (Parser, platform::mocks::SentLog) {
    let transport = MockTransport::new();
    let log = transport.log();
    let parser = Parser::new(transport, AtConfig::default());
    parser.start();
    (parser, log)
}

#[tokio::test]
async fn test_signal_quality_from_two_chunks() {
    let (parser, log) = started();

    let (res, ()) = join(commands::signal_quality(&parser), async {
        yield_now().await;
        parser.feed(b"\r\n+CSQ: 1").unwrap();
        yield_now().await;
        parser.feed(b"5,99\r\n\r\nOK\r\n").unwrap();
    })
    .await;

    assert_eq!(res, Ok(SignalQuality { rssi: 15, ber: 99 }));
    assert_eq!(log.sent_text(), vec!["AT+CSQ\r\n".to_string()]);
}

#[tokio::test]
async fn test_commands_are_serialised() {
    let (parser, log) = started();

    let first = commands::manufacturer_id::<_, 32>(&parser);
    let second = commands::module_id::<_, 32>(&parser);
    let modem = async {
        yield_now().await;
        // The second command is still waiting for the command lock.
        assert_eq!(log.sent_text(), vec!["AT+CGMI\r\n".to_string()]);
        parser.feed(b"\r\nQuectel\r\n\r\nOK\r\n").unwrap();

        while log.sent().len() < 2 {
            yield_now().await;
        }
        assert_eq!(log.sent_text()[1], "AT+CGMM\r\n");
        parser.feed(b"\r\nEC20F\r\n\r\nOK\r\n").unwrap();
    };

    let (a, b, ()) = join3(first, second, modem).await;
    assert_eq!(a.unwrap().as_str(), "Quectel");
    assert_eq!(b.unwrap().as_str(), "EC20F");
}

#[tokio::test]
async fn test_error_reply_is_command_failed() {
    let (parser, _log) = started();

    let (res, ()) = join(commands::read_pin(&parser), async {
        yield_now().await;
        parser.feed(b"\r\n+CME ERROR: 10\r\n").unwrap();
    })
    .await;
    assert_eq!(res, Err(AtError::CommandFailed));
}

#[tokio::test]
async fn test_pin_is_validated_before_sending() {
    let (parser, log) = started();

    assert_eq!(commands::set_pin(&parser, "12345").await, Err(AtError::InvalidArg));
    assert!(log.sent().is_empty());

    let (res, ()) = join(commands::set_pin(&parser, "1234"), async {
        yield_now().await;
        parser.feed(b"\r\nOK\r\n").unwrap();
    })
    .await;
    assert_eq!(res, Ok(()));
    assert_eq!(log.sent_text(), vec!["AT+CPIN=1234\r\n".to_string()]);
}

#[tokio::test]
async fn test_pdp_context_command_format() {
    let (parser, log) = started();
    let pdp = commands::PdpContext {
        cid: 1,
        pdp_type: "IP",
        apn: "internet",
    };

    let (res, ()) = join(commands::set_pdp_context(&parser, &pdp), async {
        yield_now().await;
        parser.feed(b"\r\nOK\r\n").unwrap();
    })
    .await;
    assert_eq!(res, Ok(()));
    assert_eq!(
        log.sent_text(),
        vec!["AT+CGDCONT=1,\"IP\",\"internet\"\r\n".to_string()]
    );
}

#[tokio::test]
async fn test_silent_modem_times_out() {
    let (parser, _log) = started();
    let res = parser
        .send_command("AT", Duration::from_millis(30), |t| t.contains("OK"))
        .await;
    assert_eq!(res, Err(AtError::Timeout));
}

#[tokio::test]
async fn test_pump_delivers_echoed_response() {
    let transport = MockTransport::new();
    let parser: AtParser<NoopRawMutex, _, 128, 256> = AtParser::new(
        transport,
        AtConfig {
            skip_first_line: true,
        },
    );
    parser.start();
    let mut reader = ChunkedReader::new(["AT+CPIN?\r\n+CPIN: ", "SIM PIN2\r\n", "\r\nOK\r\n"]);

    let (res, exit) = join(commands::read_pin(&parser), async {
        yield_now().await;
        pump(&parser, &mut reader).await
    })
    .await;

    assert_eq!(res, Ok(PinState::SimPin2));
    assert_eq!(exit, Ok(PumpExit::Eof));
}

#[tokio::test]
async fn test_stop_from_another_task() {
    static PARSER: static_parser::Cell = static_parser::Cell::new();
    let parser = PARSER.get();
    parser.start();

    let stopper = tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        PARSER.get().stop();
    });

    let res = parser
        .send_command("ATD*99***1#", Duration::from_secs(5), |t| t.contains("CONNECT"))
        .await;
    stopper.await.unwrap();
    assert_eq!(res, Err(AtError::NotFinished));
}

/// A parser shared between tokio tasks needs a `Sync` mutex flavour.
mod static_parser {
    use super::*;
    use std::sync::OnceLock;

    pub type Shared = AtParser<CriticalSectionRawMutex, MockTransport, 128, 256>;

    pub struct Cell(OnceLock<Shared>);

    impl Cell {
        pub const fn new() -> Self {
            Self(OnceLock::new())
        }

        pub fn get(&self) -> &Shared {
            self.0
                .get_or_init(|| Shared::new(MockTransport::new(), AtConfig::default()))
        }
    }
}
