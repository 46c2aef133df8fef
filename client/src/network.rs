use crate::console::Console;
use crate::error::ClientError;
use log::{debug, info, warn};
use shared::{is_quit_command, LineReader, LineWriter, QUIT_COMMAND};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// How a client run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The user typed the quit command
    Quit,
    /// The input source ran dry; treated like a quit
    InputClosed,
    /// The server hung up or the connection failed
    ServerClosed,
}

pub struct Client<R = OwnedReadHalf, W = OwnedWriteHalf> {
    server_addr: String,
    reader: LineReader<R>,
    writer: LineWriter<W>,
}

impl Client {
    /// Opens the connection. There is no retry; a failure is final.
    pub async fn connect(server_addr: &str) -> Result<Self, ClientError> {
        info!("Connecting to server...");

        let stream = TcpStream::connect(server_addr)
            .await
            .map_err(ClientError::Connect)?;
        let (reader, writer) = stream.into_split();

        info!("Connected to {}", server_addr);

        Ok(Client::from_parts(server_addr, reader, writer))
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps an already established connection to `server_addr`
    pub fn from_parts(server_addr: &str, reader: R, writer: W) -> Self {
        Client {
            server_addr: server_addr.to_string(),
            reader: LineReader::new(reader),
            writer: LineWriter::new(writer),
        }
    }

    /// Relays typed lines to the server and server lines to `output`
    ///
    /// Both directions are serviced concurrently. Ends on the quit command,
    /// at the end of `input`, or when the server goes away.
    pub async fn run<I, O>(mut self, input: I, output: &mut O) -> Result<Exit, ClientError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut input = LineReader::new(input);
        let mut console = Console::new(output);

        console.prompt().await?;

        loop {
            tokio::select! {
                incoming = self.reader.read_line() => match incoming {
                    Ok(Some(line)) => console.print_line(&line).await?,
                    Ok(None) => {
                        debug!("{} closed the connection", self.server_addr);
                        return server_closed(&mut console).await;
                    }
                    Err(e) => {
                        warn!("Error receiving from {}: {}", self.server_addr, e);
                        return server_closed(&mut console).await;
                    }
                },

                typed = input.read_line() => match typed? {
                    Some(line) if is_quit_command(&line) => {
                        return self.leave(&mut console, Exit::Quit).await;
                    }
                    Some(line) => {
                        if let Err(e) = self.writer.write_line(&line).await {
                            warn!("Error sending to {}: {}", self.server_addr, e);
                            return server_closed(&mut console).await;
                        }
                        console.prompt().await?;
                    }
                    None => return self.leave(&mut console, Exit::InputClosed).await,
                },
            }
        }
    }

    async fn leave<O>(&mut self, console: &mut Console<O>, exit: Exit) -> Result<Exit, ClientError>
    where
        O: AsyncWrite + Unpin,
    {
        // The server may already be gone; leaving is still a success
        if let Err(e) = self.writer.write_line(QUIT_COMMAND).await {
            debug!("Failed to send quit to {}: {}", self.server_addr, e);
        }
        console.print_line("You have left the chat.").await?;
        Ok(exit)
    }
}

async fn server_closed<O>(console: &mut Console<O>) -> Result<Exit, ClientError>
where
    O: AsyncWrite + Unpin,
{
    console.print_line("Connection closed by server.").await?;
    Ok(Exit::ServerClosed)
}
