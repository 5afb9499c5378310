//! Wire protocol
//!
//! Stream messages are length-prefixed frames; datagrams carry a single
//! unframed payload message.
//!
//! ```text
//! stream frame:  [u32 BE length][type tag][fields...]
//! datagram:      [0x04][sender][data]
//!
//! 0x01 JoinRequest   identity: str16, datagram_port: u16
//! 0x02 JoinResponse  available: u8
//! 0x03 Chat          sender: str16, body: str32
//! 0x04 Payload       sender: str16, data: bytes32
//! ```

pub mod codec;
pub mod message;

pub use codec::{chat_encoded_len, decode, encode, read_frame, write_frame};
pub use message::{ChatMessage, Message, PayloadMessage};

/// Largest stream frame body accepted
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Largest UDP datagram over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest binary payload carried in one datagram
pub const MAX_PAYLOAD_SIZE: usize = 60 * 1024;

/// Longest registrable identity in bytes; keeps a full payload plus its
/// sender inside one datagram
pub const MAX_IDENTITY_SIZE: usize = 255;

/// Sender name used for server-generated notices; never registrable
pub const SYSTEM_SENDER: &str = "Server";
