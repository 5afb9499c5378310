//! Multiplexed client session
//!
//! One identity, three transports, four duties:
//!
//! ```text
//!                     ChatSession
//!   ┌──────────────┬───────────────┬────────────────┐
//!   │ chat stream  │ datagram sock │ multicast sock │
//!   └──┬───────▲───┴──────┬────────┴───────┬────────┘
//!      │       │          │                │
//!   receive  send      receive          receive
//!   (task)  (caller)   (task)           (task)
//!      │                  │                │
//!      └──────────► mpsc<ClientEvent> ◄────┘
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::command::Command;
use super::config::ClientConfig;
use super::event::{ClientEvent, Transport};
use super::multicast;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{
    decode, encode, read_frame, write_frame, ChatMessage, Message, PayloadMessage,
    MAX_DATAGRAM_SIZE,
};

/// A registered chat participant
///
/// # Example
/// ```no_run
/// use chatmux::client::{ChatSession, ClientConfig, Command};
///
/// # async fn example() -> chatmux::Result<()> {
/// let config = ClientConfig::default().disable_multicast();
/// let (session, mut events) = ChatSession::connect(config, "alice").await?;
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// session.execute(Command::Chat("hello".into())).await?;
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatSession {
    identity: String,
    config: ClientConfig,
    local_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    datagram: Arc<UdpSocket>,
    multicast_tx: Option<UdpSocket>,
    tasks: Vec<JoinHandle<()>>,
    closed: AtomicBool,
}

impl ChatSession {
    /// Connect, register `identity` and start the receive duties.
    ///
    /// Returns the session and a receiver for everything it observes.
    /// A taken identity fails with [`Error::IdentityUnavailable`].
    pub async fn connect(
        config: ClientConfig,
        identity: impl Into<String>,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let identity = identity.into();

        // Group membership comes first; registration is announced to everyone
        let (multicast_rx, multicast_tx) = match config.multicast {
            Some(ref mc) => (
                Some(multicast::bind_receiver(mc)?),
                Some(multicast::bind_sender(mc)?),
            ),
            None => (None, None),
        };

        let stream = TcpStream::connect(config.server_addr).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        let datagram = Arc::new(bind_datagram(local_addr).await?);
        let datagram_port = datagram.local_addr()?.port();

        let (mut reader, mut writer) = stream.into_split();
        handshake(&mut reader, &mut writer, &identity, datagram_port).await?;

        tracing::info!(
            identity = %identity,
            local = %local_addr,
            datagram_port = datagram_port,
            "Registered with server"
        );

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let mut tasks = Vec::with_capacity(3);

        tasks.push(tokio::spawn(receive_chat(
            reader,
            identity.clone(),
            config.max_decode_errors,
            event_tx.clone(),
        )));
        tasks.push(tokio::spawn(receive_payloads(
            Arc::clone(&datagram),
            Transport::Direct,
            event_tx.clone(),
        )));
        if let Some(socket) = multicast_rx {
            tasks.push(tokio::spawn(receive_payloads(
                Arc::new(socket),
                Transport::Multicast,
                event_tx,
            )));
        }

        let session = Self {
            identity,
            config,
            local_addr,
            writer: Mutex::new(writer),
            datagram,
            multicast_tx,
            tasks,
            closed: AtomicBool::new(false),
        };

        Ok((session, event_rx))
    }

    /// Registered identity
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Local address of the chat stream
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Local address of the point-to-point datagram socket
    pub fn datagram_addr(&self) -> Result<SocketAddr> {
        Ok(self.datagram.local_addr()?)
    }

    /// Check if the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send chat text to every participant
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let msg = Message::Chat(ChatMessage::new(self.identity.clone(), text));
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &msg).await
    }

    /// Send a payload through the server's datagram relay
    pub async fn send_direct(&self, data: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        let datagram = self.encode_payload(data)?;
        self.datagram
            .send_to(&datagram, self.config.relay_addr)
            .await?;
        tracing::debug!(size = datagram.len(), relay = %self.config.relay_addr, "Payload sent");
        Ok(())
    }

    /// Send a payload to the multicast group
    pub async fn send_multicast(&self, data: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        let (socket, group) = match (&self.multicast_tx, &self.config.multicast) {
            (Some(socket), Some(mc)) => (socket, mc.group_addr()),
            _ => return Err(Error::MulticastDisabled),
        };
        let datagram = self.encode_payload(data)?;
        socket.send_to(&datagram, group).await?;
        tracing::debug!(size = datagram.len(), group = %group, "Multicast payload sent");
        Ok(())
    }

    /// Carry out one user command.
    ///
    /// Payload commands read [`ClientConfig::payload_path`].
    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Chat(text) => self.send_chat(text).await,
            Command::SendDirect => {
                let payload = self.load_payload().await?;
                self.send_direct(payload).await
            }
            Command::SendMulticast => {
                let payload = self.load_payload().await?;
                self.send_multicast(payload).await
            }
        }
    }

    /// Run the send duty over a line source until it ends, then close.
    ///
    /// Blank lines are ignored. Commands rejected locally (oversized input,
    /// unreadable payload file) are logged and input continues. A failed
    /// chat write means the stream is gone and ends the duty with that error.
    pub async fn drive_input<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            };

            let Some(command) = Command::parse(&line) else {
                continue;
            };

            let is_chat = matches!(command, Command::Chat(_));
            match self.execute(command).await {
                Ok(()) => {}
                Err(e @ (Error::Io(_) | Error::SessionClosed)) if is_chat => break Err(e),
                Err(e) => tracing::warn!(error = %e, chat = is_chat, "Command not sent"),
            }
        };

        self.close().await;
        result
    }

    /// Close the chat stream and stop the receive duties. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "Stream shutdown failed");
        }

        for task in &self.tasks {
            task.abort();
        }

        tracing::info!(identity = %self.identity, "Session closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn encode_payload(&self, data: impl Into<Bytes>) -> Result<Bytes> {
        encode(&Message::Payload(PayloadMessage::new(
            self.identity.clone(),
            data,
        )))
    }

    async fn load_payload(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.config.payload_path).await?)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Bind the point-to-point socket on the stream's local endpoint, or on an
/// ephemeral port if that one is taken.
async fn bind_datagram(local: SocketAddr) -> Result<UdpSocket> {
    match UdpSocket::bind(local).await {
        Ok(socket) => Ok(socket),
        Err(e) => {
            tracing::debug!(addr = %local, error = %e, "Datagram port taken, using ephemeral");
            Ok(UdpSocket::bind(SocketAddr::new(local.ip(), 0)).await?)
        }
    }
}

async fn handshake(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    identity: &str,
    datagram_port: u16,
) -> Result<()> {
    let request = Message::JoinRequest {
        identity: identity.to_owned(),
        datagram_port,
    };
    write_frame(writer, &request).await?;

    match read_frame(reader).await? {
        Some(Message::JoinResponse { available: true }) => Ok(()),
        Some(Message::JoinResponse { available: false }) => {
            Err(Error::IdentityUnavailable(identity.to_owned()))
        }
        Some(other) => Err(ProtocolError::UnexpectedMessage(format!(
            "{} instead of join response",
            other.kind()
        ))
        .into()),
        None => Err(Error::ConnectionClosed),
    }
}

/// Stream-receive duty.
///
/// Malformed frames are skipped, but more than `max_decode_errors` in a row
/// ends the session. EOF and I/O errors end it immediately.
async fn receive_chat(
    mut reader: OwnedReadHalf,
    identity: String,
    max_decode_errors: u32,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut consecutive_errors = 0u32;

    let reason = loop {
        match read_frame(&mut reader).await {
            Ok(Some(Message::Chat(chat))) => {
                consecutive_errors = 0;
                if chat.sender == identity {
                    continue;
                }
                let event = ClientEvent::Chat {
                    sender: chat.sender,
                    body: chat.body,
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Ok(Some(other)) => {
                tracing::debug!(kind = other.kind(), "Ignoring unexpected message");
            }
            Ok(None) => break "server closed the connection".to_owned(),
            Err(e) if e.is_transient() => {
                consecutive_errors += 1;
                tracing::warn!(
                    error = %e,
                    consecutive = consecutive_errors,
                    "Malformed chat frame skipped"
                );
                if consecutive_errors > max_decode_errors {
                    break format!("too many malformed frames: {}", e);
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    tracing::info!(reason = %reason, "Chat stream ended");
    let _ = events.send(ClientEvent::Disconnected { reason }).await;
}

/// Datagram-receive duty, shared by the point-to-point and multicast sockets.
///
/// Each socket has exactly one reader, so receives need no lock.
async fn receive_payloads(
    socket: Arc<UdpSocket>,
    transport: Transport,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(transport = ?transport, error = %e, "Datagram receive failed");
                continue;
            }
        };

        let payload = match decode(&buf[..len]) {
            Ok(Message::Payload(payload)) => payload,
            Ok(other) => {
                tracing::warn!(from = %from, kind = other.kind(), "Non-payload datagram skipped");
                continue;
            }
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "Malformed datagram skipped");
                continue;
            }
        };

        let event = ClientEvent::Payload {
            transport,
            sender: payload.sender,
            data: payload.data,
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}
