//! Terminal output for the chat client

use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const PROMPT: &str = "> ";

/// Writes chat lines and status notices to the user's terminal
pub struct Console<O> {
    out: O,
}

impl<O: AsyncWrite + Unpin> Console<O> {
    pub fn new(out: O) -> Self {
        Self { out }
    }

    pub async fn print_line(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }

    pub async fn prompt(&mut self) -> std::io::Result<()> {
        self.out.write_all(PROMPT.as_bytes()).await?;
        self.out.flush().await
    }

    pub fn into_inner(self) -> O {
        self.out
    }
}
