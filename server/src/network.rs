//! Server network layer: accepts TCP connections and starts their sessions

use crate::connection::Connection;
use crate::error::ServerError;
use crate::identity::IdentityAllocator;
use crate::registry::Registry;
use crate::session::ClientSession;
use log::{debug, info};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Listener loop owning the socket, the identity counter and the registry
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    identities: IdentityAllocator,
}

impl Server {
    /// Binds the listening socket. Failure here is fatal for the service.
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        let server = Self::from_listener(listener, Registry::new());
        info!("Server listening on {}", server.local_addr()?);
        Ok(server)
    }

    /// Wraps an already bound listener around the given registry
    pub fn from_listener(listener: TcpListener, registry: Registry) -> Self {
        Self {
            listener,
            registry,
            identities: IdentityAllocator::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Accepts connections until accepting fails
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accepts connections until `shutdown` resolves or accepting fails
    ///
    /// On shutdown every registered connection is closed; the sessions then
    /// unregister themselves from their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    let closed = self.registry.close_all();
                    info!("Server shutting down, closed {} connection(s)", closed);
                    return Ok(());
                },

                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.map_err(ServerError::Accept)?;
                    self.handle_connection(stream, addr);
                },
            }
        }
    }

    /// Assigns an identity, registers the session and spawns its receive loop
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to disable Nagle for {}: {}", addr, e);
        }

        let identity = self.identities.next();
        let session = ClientSession::start(identity, Connection::from_tcp(stream), &self.registry);
        info!("{} connected.", identity);
        debug!("{} is {}", identity, addr);

        tokio::spawn(session.run());
    }
}
