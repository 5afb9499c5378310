//! Chat client
//!
//! A [`ChatSession`] multiplexes three transports for one identity:
//! - the chat stream to the server (text)
//! - a point-to-point datagram socket, relayed by the server (payloads)
//! - a multicast group membership, bypassing the server (payloads)

pub mod command;
pub mod config;
pub mod event;
pub mod multicast;
pub mod session;

pub use command::Command;
pub use config::{ClientConfig, MulticastConfig};
pub use event::{ClientEvent, Transport};
pub use session::ChatSession;
