//! # Chat Server Library
//!
//! This library implements a line-based broadcast chat server. Clients
//! connect over TCP, send newline-delimited text, and every line is fanned
//! out to all connected clients prefixed with the sender's identity.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Each accepted connection gets the next sequential identity (`User1`,
//! `User2`, ...), a welcome line, and its own receive loop running as an
//! independent task. The loop ends when the client sends `/quit`, hangs up,
//! or an I/O error occurs, after which the session is unregistered and its
//! connection closed exactly once.
//!
//! ### Membership and Broadcast
//! The registry is the single piece of shared mutable state. Broadcasts take
//! a snapshot of the membership and push the formatted line onto every
//! member's outbound queue, the sender included. A member that has gone away
//! is skipped without affecting delivery to anyone else, and a member whose
//! bounded queue has filled up is disconnected.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Line-oriented read and write halves over one stream, plus an idempotent
//! close signal that also unblocks a pending read.
//!
//! ### Session Module (`session`)
//! Welcome, receive loop, per-client writer task and the drop guard that
//! guarantees cleanup on every exit path.
//!
//! ### Registry Module (`registry`)
//! The concurrency-safe set of live sessions: add, remove, broadcast and
//! close-all for shutdown.
//!
//! ### Network Module (`network`)
//! The listener loop: binds the port, accepts connections and spawns a
//! session for each one.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("0.0.0.0:12345").await?;
//!
//!     // Accept clients until Ctrl+C, then disconnect everyone
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod identity;
pub mod network;
pub mod registry;
pub mod session;

pub use error::ServerError;
pub use identity::Identity;
pub use network::Server;
pub use registry::Registry;
