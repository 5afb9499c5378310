//! Multi-transport chat server and client
//!
//! The server accepts chat connections, gives each a unique identity and
//! fans every message out to all connected clients. Clients also exchange
//! binary payloads over two datagram transports: point-to-point through the
//! server's relay, and a multicast group that bypasses the server.
//!
//! # Server
//! ```no_run
//! use chatmux::{ChatServer, ServerConfig};
//!
//! # async fn example() -> chatmux::Result<()> {
//! let server = ChatServer::bind(ServerConfig::default()).await?;
//! server.run().await
//! # }
//! ```
//!
//! # Client
//! ```no_run
//! use chatmux::{ChatSession, ClientConfig};
//!
//! # async fn example() -> chatmux::Result<()> {
//! let (session, mut events) = ChatSession::connect(ClientConfig::default(), "alice").await?;
//! session.send_chat("hello").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use client::{ChatSession, ClientConfig, ClientEvent, Command, MulticastConfig, Transport};
pub use error::{Error, ProtocolError, Result};
pub use registry::Registry;
pub use server::{ChatServer, ServerConfig};
