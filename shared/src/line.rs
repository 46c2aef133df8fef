//! Newline-delimited text framing shared by the server and the client.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest accepted line in bytes, terminator excluded
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

fn into_io_error(error: LinesCodecError) -> std::io::Error {
    match error {
        LinesCodecError::MaxLineLengthExceeded => std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "line exceeds maximum length",
        ),
        LinesCodecError::Io(e) => e,
    }
}

/// Reads `\n` or `\r\n` terminated UTF-8 lines from a byte stream.
///
/// `read_line` is cancel safe: bytes of a partially received line stay in
/// the frame buffer and the next call carries on from them, so it can sit in
/// a `select!`.
pub struct LineReader<R> {
    inner: FramedRead<R, LinesCodec>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_length(reader, MAX_LINE_LENGTH)
    }

    pub fn with_max_length(reader: R, max_length: usize) -> Self {
        Self {
            inner: FramedRead::new(reader, LinesCodec::new_with_max_length(max_length)),
        }
    }

    /// Waits for the next complete line and returns it without its terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed its side. Bytes left over
    /// without a terminator at end-of-stream are returned as a final line.
    /// Invalid UTF-8 and over-long lines surface as `InvalidData` errors.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.inner.next().await.transpose().map_err(into_io_error)
    }
}

/// Writes lines with a trailing `\n`, flushing after every line.
pub struct LineWriter<W> {
    inner: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, LinesCodec::new()),
        }
    }

    pub async fn write_line(&mut self, text: &str) -> std::io::Result<()> {
        self.inner.send(text).await.map_err(into_io_error)
    }

    /// Flushes and closes the write direction so the peer sees end-of-stream.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        SinkExt::<&str>::close(&mut self.inner)
            .await
            .map_err(into_io_error)
    }
}
