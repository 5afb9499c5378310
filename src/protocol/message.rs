//! Protocol message types

use bytes::Bytes;

/// Text message relayed over the chat stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Identity of the author
    pub sender: String,
    /// Message text
    pub body: String,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Server notice that `identity` joined
    pub fn joined(identity: &str) -> Self {
        Self::new(super::SYSTEM_SENDER, format!("{} joined the chat!", identity))
    }

    /// Server notice that `identity` left
    pub fn left(identity: &str) -> Self {
        Self::new(super::SYSTEM_SENDER, format!("{} left the chat!", identity))
    }
}

/// Binary payload exchanged over the datagram transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMessage {
    /// Identity of the author
    pub sender: String,
    /// Raw payload bytes
    pub data: Bytes,
}

impl PayloadMessage {
    pub fn new(sender: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            sender: sender.into(),
            data: data.into(),
        }
    }
}

/// Every message that crosses the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client asks to register under `identity`
    JoinRequest {
        identity: String,
        /// Port of the client's datagram socket; 0 means "derive it"
        datagram_port: u16,
    },
    /// Server answer to a join request
    JoinResponse { available: bool },
    /// Chat text
    Chat(ChatMessage),
    /// Binary payload (datagrams only)
    Payload(PayloadMessage),
}

impl Message {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::JoinRequest { .. } => "join-request",
            Message::JoinResponse { .. } => "join-response",
            Message::Chat(_) => "chat",
            Message::Payload(_) => "payload",
        }
    }
}

impl From<ChatMessage> for Message {
    fn from(msg: ChatMessage) -> Self {
        Message::Chat(msg)
    }
}

impl From<PayloadMessage> for Message {
    fn from(msg: PayloadMessage) -> Self {
        Message::Payload(msg)
    }
}
