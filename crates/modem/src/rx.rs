//! Receive pump: drains a byte source into the parser.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::Read;
use platform::Transport;

use crate::error::AtError;
use crate::parser::{AtParser, ParserState};

/// Bytes moved from the source per read.
pub const PUMP_CHUNK: usize = 64;

/// Why [`pump`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PumpExit {
    /// The source reported end of stream.
    Eof,
    /// The source returned an error.
    ReadFailed,
}

/// Move bytes from `reader` into `parser` until the source ends.
///
/// Unsolicited lines arriving while no command is outstanding are dropped
/// by the parser and do not end the pump, and idle bytes that fill the
/// receive buffer without a line break are flushed. Any other feed error
/// ends it, as does a command response that overflows the buffer.
pub async fn pump<M, T, R, const TX: usize, const RX: usize>(
    parser: &AtParser<M, T, TX, RX>,
    reader: &mut R,
) -> Result<PumpExit, AtError>
where
    M: RawMutex,
    T: Transport,
    R: Read,
{
    let mut chunk = [0u8; PUMP_CHUNK];
    loop {
        // Never read more than the parser can take.
        let free = parser.with_response_buffer(|tail| tail.len()).min(PUMP_CHUNK);
        if free == 0 {
            if parser.state() == ParserState::Processing {
                log_error!("AT response overflows the receive buffer, pump stopped");
                return Err(AtError::InvalidSize);
            }
            log_warn!("AT receive buffer full of idle bytes, flushed");
            parser.flush();
            continue;
        }
        let window = chunk.get_mut(..free).unwrap_or_default();
        let n = match reader.read(window).await {
            Ok(0) => return Ok(PumpExit::Eof),
            Ok(n) => n,
            Err(_) => {
                log_warn!("modem byte source failed");
                return Ok(PumpExit::ReadFailed);
            }
        };
        let bytes = chunk.get(..n).unwrap_or_default();
        match parser.feed(bytes) {
            Ok(()) => {}
            Err(AtError::InvalidState) if !parser.is_stopped() => {
                log_trace!("dropped {} idle bytes", n);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::config::AtConfig;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use platform::mocks::{ChunkedReader, MockTransport};

    #[tokio::test]
    async fn test_pump_survives_idle_urc() {
        let parser: AtParser<NoopRawMutex, _, 64, 128> =
            AtParser::new(MockTransport::new(), AtConfig::default());
        parser.start();
        let mut reader = ChunkedReader::new(["\r\n+CEREG: 5\r\n", "RDY"]);

        assert_eq!(pump(&parser, &mut reader).await, Ok(PumpExit::Eof));
        // Only the trailing partial line is still buffered.
        assert_eq!(parser.with_response_buffer(|tail| tail.len()), 128 - 3);
    }

    #[tokio::test]
    async fn test_pump_flushes_idle_noise() {
        let parser: AtParser<NoopRawMutex, _, 64, 128> =
            AtParser::new(MockTransport::new(), AtConfig::default());
        parser.start();
        let noise = "~".repeat(130);
        let mut reader = ChunkedReader::new([noise.as_str(), "\r\n+CEREG: 1\r\n", "RDY"]);

        assert_eq!(pump(&parser, &mut reader).await, Ok(PumpExit::Eof));
        assert_eq!(parser.with_response_buffer(|tail| tail.len()), 128 - 3);
    }

    #[tokio::test]
    async fn test_pump_stops_on_stopped_parser() {
        let parser: AtParser<NoopRawMutex, _, 64, 128> =
            AtParser::new(MockTransport::new(), AtConfig::default());
        let mut reader = ChunkedReader::new(["OK\r\n"]);

        assert_eq!(pump(&parser, &mut reader).await, Err(AtError::InvalidState));
    }
}
