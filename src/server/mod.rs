//! Chat server
//!
//! ```text
//!  client ──join──► Connection ──chat──► BroadcastEngine ──► every ClientHandle
//!                        │                      ▲
//!                        └── Registry ◄─────────┤
//!                                               │
//!  client ──udp──► DatagramRelay ──snapshot─────┘──► every datagram endpoint
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod listener;
pub mod relay;

pub use broadcast::{BroadcastEngine, BroadcastSender};
pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::ChatServer;
pub use relay::DatagramRelay;
