//! Per-client session: welcome, receive loop and guaranteed cleanup

use crate::connection::{CloseSignal, Connection, ConnectionReader, ConnectionWriter};
use crate::identity::Identity;
use crate::registry::{Member, Outbound, Registry, OUTBOUND_CAPACITY};
use log::{debug, info, warn};
use shared::{is_quit_command, welcome_message};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Why a session's receive loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent the quit command
    Quit,
    /// The peer closed its side of the stream
    PeerClosed,
    /// Reading from the peer failed
    ReadError,
    /// The connection was closed on the server side, by shutdown, a failed
    /// write or an outbound queue that filled up
    Closed,
}

/// Registry membership tied to a scope
///
/// Dropping it closes the connection and unregisters the session, so cleanup
/// runs exactly once whichever way the session ends, including a panic or
/// the task being dropped.
struct Registration {
    registry: Registry,
    identity: Identity,
    close: CloseSignal,
    // False when the identity was already taken; the entry is not ours to remove
    registered: bool,
}

impl Registration {
    fn new(registry: Registry, member: Member, close: CloseSignal) -> Self {
        let identity = member.identity;
        let registered = registry.add(member);
        if !registered {
            warn!("{} is already registered, closing the new connection", identity);
            close.close();
        }
        Self {
            registry,
            identity,
            close,
            registered,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.close.close();
        if self.registered && self.registry.remove(&self.identity) {
            info!("{} disconnected.", self.identity);
        }
    }
}

/// Server-side state of one connected client
pub struct ClientSession<R> {
    reader: ConnectionReader<R>,
    registration: Registration,
}

impl<R> ClientSession<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Greets the client and registers it, ready for [`ClientSession::run`].
    ///
    /// The welcome line is queued before the session joins the registry and
    /// the writer task only starts afterwards, so the client always sees the
    /// welcome first and seeing it means the session is already a member.
    pub fn start<W>(identity: Identity, connection: Connection<R, W>, registry: &Registry) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let close = connection.close_signal();
        let (reader, writer) = connection.split();
        let (outbound, queue) = Outbound::channel(OUTBOUND_CAPACITY);

        // The queue is fresh and its receiver alive, so this cannot fail
        let _ = outbound.send(welcome_message(&identity.to_string()));

        let member = Member::new(identity, outbound, close.clone());
        let registration = Registration::new(registry.clone(), member, close.clone());

        tokio::spawn(drain_outbound(identity, writer, queue, close));

        Self {
            reader,
            registration,
        }
    }

    pub fn identity(&self) -> Identity {
        self.registration.identity
    }

    /// Runs the receive loop until the client quits, hangs up, errors or the
    /// connection is closed, then unregisters and closes the connection.
    pub async fn run(mut self) -> SessionEnd {
        let identity = self.identity();

        let end = loop {
            match self.reader.read_line().await {
                Ok(Some(line)) => {
                    if is_quit_command(&line) {
                        debug!("{} sent quit", identity);
                        break SessionEnd::Quit;
                    }
                    let report = self.registration.registry.broadcast(identity, &line);
                    debug!(
                        "{} broadcast to {} member(s), {} failed",
                        identity, report.delivered, report.failed
                    );
                }
                Ok(None) if self.registration.close.is_closed() => {
                    debug!("{} connection closed by server", identity);
                    break SessionEnd::Closed;
                }
                Ok(None) => {
                    debug!("{} connection closed by peer", identity);
                    break SessionEnd::PeerClosed;
                }
                Err(e) => {
                    debug!("Read error for {}: {}", identity, e);
                    break SessionEnd::ReadError;
                }
            }
        };

        drop(self.registration);
        end
    }
}

/// Writes queued lines to the client in order
///
/// Runs until a write fails, the queue closes, or the connection is closed.
/// Closing stops the task even while a write is blocked on a peer that does
/// not read, and dropping the writer releases the stream. Lines still queued
/// at that point are discarded.
async fn drain_outbound<W>(
    identity: Identity,
    mut writer: ConnectionWriter<W>,
    mut queue: mpsc::Receiver<String>,
    close: CloseSignal,
) where
    W: AsyncWrite + Unpin,
{
    let drained = async {
        while let Some(line) = queue.recv().await {
            if let Err(e) = writer.write_line(&line).await {
                debug!("Write error for {}: {}", identity, e);
                return;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown error for {}: {}", identity, e);
        }
    };

    tokio::select! {
        _ = close.closed() => debug!("Writer for {} stopped by close", identity),
        _ = drained => {}
    }
}
