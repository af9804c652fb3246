//! Byte-stream transport towards the modem (DCE).
//!
//! The AT engine only ever needs to push one complete command buffer at a
//! time; inbound bytes travel the other way through the parser's
//! response-buffer API, so the receive half is any
//! [`embedded_io_async::Read`].

use embedded_io_async::Write;

/// Byte sink used by the AT parser to issue commands.
///
/// Implementations may deliver the buffer in one write or several, but must
/// not return before every byte has been accepted by the link.
pub trait Transport {
    /// Error type
    type Error: core::fmt::Debug;

    /// Send `bytes` to the modem.
    fn send(&mut self, bytes: &[u8]) -> impl core::future::Future<Output = Result<(), Self::Error>>;
}

/// Every async writer (UART, USB-CDC class, TCP socket on the host) is a
/// transport.
impl<W: Write> Transport for W {
    type Error = W::Error;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.write_all(bytes).await?;
        self.flush().await
    }
}
