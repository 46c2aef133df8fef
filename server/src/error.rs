use std::io;
use thiserror::Error;

/// Failures that stop the whole server
///
/// Per-connection I/O problems never show up here; they only end the
/// affected session.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}
