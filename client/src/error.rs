use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unable to connect to server: {0}")]
    Connect(#[source] io::Error),

    #[error("connection error: {0}")]
    Io(#[from] io::Error),
}
