//! # Chat Client Library
//!
//! A thin terminal client for the line broadcast chat server. It relays
//! everything the user types to the server and prints everything the server
//! sends back, one line at a time.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Opens the TCP connection and runs the relay loop, servicing keyboard
//! input and server output concurrently. Typing `/quit` (any case) or
//! closing the input tells the server goodbye and ends the run; a server
//! hangup ends it too.
//!
//! ### Console Module (`console`)
//! Prompt and line output for the user's terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("localhost:12345").await?;
//!     client.run(tokio::io::stdin(), &mut tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod error;
pub mod network;

pub use error::ClientError;
pub use network::{Client, Exit};
