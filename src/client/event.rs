//! Events delivered to the session owner

use bytes::Bytes;

/// Datagram transport a payload arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Point-to-point, relayed by the server
    Direct,
    /// Multicast group
    Multicast,
}

/// Something the session observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Chat text from another participant or the server
    Chat { sender: String, body: String },

    /// Binary payload from a datagram transport
    Payload {
        transport: Transport,
        sender: String,
        data: Bytes,
    },

    /// The chat stream ended; no further chat events follow
    Disconnected { reason: String },
}
