//! Connection handle wrapping one accepted stream
//!
//! A [`Connection`] owns both directions of a client stream plus a
//! [`CloseSignal`]. Sessions split it so the receive loop owns the read side
//! and the writer task owns the write side, while either of them (or the
//! registry during shutdown) can close it.

use shared::{LineReader, LineWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Shared, idempotent "this connection is done" flag
///
/// Clones observe the same state. Closing wakes every task waiting in
/// [`CloseSignal::closed`], including one that starts waiting afterwards.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    token: CancellationToken,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the connection closed. Returns true unless it was already
    /// closed before this call.
    pub fn close(&self) -> bool {
        let first = !self.token.is_cancelled();
        self.token.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`CloseSignal::close`] has been called.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

pub struct Connection<R, W> {
    reader: ConnectionReader<R>,
    writer: ConnectionWriter<W>,
    close: CloseSignal,
}

impl Connection<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        let close = CloseSignal::new();
        Self {
            reader: ConnectionReader {
                lines: LineReader::new(reader),
                close: close.clone(),
            },
            writer: ConnectionWriter {
                lines: LineWriter::new(writer),
                close: close.clone(),
            },
            close,
        }
    }

    pub fn close_signal(&self) -> CloseSignal {
        self.close.clone()
    }

    pub fn close(&self) -> bool {
        self.close.close()
    }

    pub fn split(self) -> (ConnectionReader<R>, ConnectionWriter<W>) {
        (self.reader, self.writer)
    }
}

/// Read side of a [`Connection`]
pub struct ConnectionReader<R> {
    lines: LineReader<R>,
    close: CloseSignal,
}

impl<R: AsyncRead + Unpin> ConnectionReader<R> {
    /// Returns the next line, or `Ok(None)` when the peer hung up or the
    /// connection was closed locally. A read blocked when the close happens
    /// returns `Ok(None)` right away.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        if self.close.is_closed() {
            return Ok(None);
        }

        tokio::select! {
            _ = self.close.closed() => Ok(None),
            line = self.lines.read_line() => line,
        }
    }
}

/// Write side of a [`Connection`]
pub struct ConnectionWriter<W> {
    lines: LineWriter<W>,
    close: CloseSignal,
}

impl<W: AsyncWrite + Unpin> ConnectionWriter<W> {
    /// Writes and flushes one line. A failed write closes the connection.
    pub async fn write_line(&mut self, text: &str) -> std::io::Result<()> {
        let result = self.lines.write_line(text).await;
        if result.is_err() {
            self.close.close();
        }
        result
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.close.close();
        self.lines.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    #[test]
    fn test_close_is_idempotent() {
        let signal = CloseSignal::new();
        let clone = signal.clone();

        assert!(!signal.is_closed());
        assert!(signal.close());
        assert!(!signal.close());
        assert!(!clone.close());
        assert!(clone.is_closed());
    }

    #[test]
    fn test_connection_close_shared_with_signal() {
        let (server_side, _peer) = duplex(64);
        let (reader, writer) = split(server_side);
        let connection = Connection::new(reader, writer);
        let signal = connection.close_signal();

        assert!(connection.close());
        assert!(!connection.close());
        assert!(signal.is_closed());
    }

    #[tokio::test]
    async fn test_closed_resolves_for_late_waiter() {
        let signal = CloseSignal::new();
        signal.close();

        timeout(Duration::from_millis(100), signal.closed())
            .await
            .expect("closed() should resolve after close()");
    }

    #[tokio::test]
    async fn test_reads_and_writes_lines() {
        let (server_side, mut peer) = duplex(256);
        let (reader, writer) = split(server_side);
        let (mut reader, mut writer) = Connection::new(reader, writer).split();

        peer.write_all(b"hello\r\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("hello"));

        writer.write_line("User1: hello").await.unwrap();
        let mut buf = [0u8; 13];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"User1: hello\n");
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (server_side, _peer) = duplex(256);
        let (reader, writer) = split(server_side);
        let connection = Connection::new(reader, writer);
        let signal = connection.close_signal();
        let (mut reader, _writer) = connection.split();

        let pending = tokio::spawn(async move { reader.read_line().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(signal.close());

        let result = timeout(Duration::from_secs(1), pending)
            .await
            .expect("blocked read should return after close")
            .unwrap();
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_peer_hangup_reads_as_end_of_stream() {
        let (server_side, peer) = duplex(256);
        let (reader, writer) = split(server_side);
        let (mut reader, _writer) = Connection::new(reader, writer).split();

        drop(peer);
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_write_closes_connection() {
        let (server_side, peer) = duplex(256);
        let (reader, writer) = split(server_side);
        let connection = Connection::new(reader, writer);
        let signal = connection.close_signal();
        let (_reader, mut writer) = connection.split();

        drop(peer);
        assert!(writer.write_line("nobody listening").await.is_err());
        assert!(signal.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_gives_peer_end_of_stream() {
        let (server_side, mut peer) = duplex(256);
        let (reader, writer) = split(server_side);
        let (_reader, mut writer) = Connection::new(reader, writer).split();

        writer.write_line("bye").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "bye\n");
    }
}
