//! Per-connection handler
//!
//! Runs the join handshake, then relays every chat message the client sends
//! into the broadcast queue until the stream fails or closes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{
    chat_encoded_len, read_frame, write_frame, ChatMessage, Message, MAX_FRAME_SIZE,
};
use crate::registry::{ClientHandle, Registry};
use crate::server::broadcast::BroadcastSender;
use crate::session::SessionState;

/// Server side of one chat connection
pub struct Connection<R, W> {
    state: SessionState,
    reader: R,
    writer: Option<W>,
    registry: Arc<Registry>,
    broadcast: BroadcastSender,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    /// Create a handler over the two halves of an accepted stream
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        reader: R,
        writer: W,
        registry: Arc<Registry>,
        broadcast: BroadcastSender,
    ) -> Self {
        Self {
            state: SessionState::new(session_id, peer_addr),
            reader,
            writer: Some(writer),
            registry,
            broadcast,
        }
    }

    /// Current session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drive the connection to completion.
    ///
    /// Returns an error only for handshake failures; a disconnect while
    /// active is the normal way for a session to end.
    pub async fn run(&mut self) -> Result<()> {
        let (identity, datagram_port) = self.read_join_request().await?;

        let Some(handle) = self.try_register(identity, datagram_port).await? else {
            return Ok(());
        };

        if !self.broadcast.enqueue(ChatMessage::joined(handle.identity())).await {
            tracing::warn!(session_id = self.state.id, "Join notice not queued");
        }

        self.relay_chat(&handle).await;
        self.close(&handle).await;
        Ok(())
    }

    async fn read_join_request(&mut self) -> Result<(String, u16)> {
        match read_frame(&mut self.reader).await? {
            Some(Message::JoinRequest {
                identity,
                datagram_port,
            }) => Ok((identity, datagram_port)),
            Some(other) => Err(ProtocolError::UnexpectedMessage(format!(
                "{} before join request",
                other.kind()
            ))
            .into()),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Register and answer the join request.
    ///
    /// The writer lock is held from registration until the response is
    /// flushed, so the response is always the first frame the client reads.
    async fn try_register(
        &mut self,
        identity: String,
        datagram_port: u16,
    ) -> Result<Option<ClientHandle>> {
        let writer = self.writer.take().ok_or(Error::SessionClosed)?;
        let handle = ClientHandle::new(
            self.state.id,
            identity,
            self.state.peer_addr,
            datagram_port,
            writer,
        );

        let mut guard = handle.lock_writer().await;
        let available = self.registry.register(handle.clone()).await;
        let response = Message::JoinResponse { available };

        if let Err(e) = write_frame(&mut *guard, &response).await {
            drop(guard);
            if available {
                self.registry
                    .unregister(handle.identity(), Some(self.state.id))
                    .await;
            }
            return Err(e);
        }

        if !available {
            if let Err(e) = guard.shutdown().await {
                tracing::debug!(session_id = self.state.id, error = %e, "Shutdown failed");
            }
            drop(guard);
            self.state.reject();
            tracing::info!(
                session_id = self.state.id,
                peer = %self.state.peer_addr,
                identity = handle.identity(),
                "Username unavailable, closing connection"
            );
            return Ok(None);
        }

        drop(guard);
        self.state.accept(handle.identity());
        Ok(Some(handle))
    }

    async fn relay_chat(&mut self, handle: &ClientHandle) {
        loop {
            match read_frame(&mut self.reader).await {
                Ok(Some(Message::Chat(mut chat))) => {
                    if chat.sender != handle.identity() {
                        tracing::debug!(
                            session_id = self.state.id,
                            claimed = %chat.sender,
                            "Rewriting sender to registered identity"
                        );
                        chat.sender = handle.identity().to_owned();
                    }
                    let size = chat_encoded_len(&chat);
                    if size > MAX_FRAME_SIZE {
                        tracing::warn!(
                            session_id = self.state.id,
                            size = size,
                            "Chat message exceeds frame limit, dropped"
                        );
                        continue;
                    }
                    self.state.on_message();
                    if !self.broadcast.enqueue(chat).await {
                        break;
                    }
                }
                Ok(Some(other)) => {
                    tracing::debug!(
                        session_id = self.state.id,
                        kind = other.kind(),
                        "Unexpected message, disconnecting"
                    );
                    break;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(session_id = self.state.id, error = %e, "Read failed");
                    break;
                }
            }
        }
    }

    async fn close(&mut self, handle: &ClientHandle) {
        self.state.begin_closing();

        self.registry
            .unregister(handle.identity(), Some(self.state.id))
            .await;
        handle.shutdown().await;

        tracing::info!(
            session_id = self.state.id,
            identity = handle.identity(),
            messages = self.state.messages_received,
            duration_secs = self.state.duration().as_secs(),
            "Client disconnected"
        );

        self.broadcast.enqueue(ChatMessage::left(handle.identity())).await;
        self.state.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::DuplexStream;

    use super::*;
    use crate::server::broadcast::BroadcastEngine;
    use crate::session::SessionPhase;

    struct Harness {
        registry: Arc<Registry>,
        broadcast: BroadcastSender,
    }

    impl Harness {
        fn new() -> Self {
            let registry = Arc::new(Registry::new());
            let (broadcast, engine) = BroadcastEngine::new(Arc::clone(&registry), 16);
            engine.spawn();
            Self {
                registry,
                broadcast,
            }
        }

        /// Spawn a handler; returns the client end of the stream
        fn connect(
            &self,
            session_id: u64,
        ) -> (
            DuplexStream,
            tokio::task::JoinHandle<(Result<()>, SessionPhase)>,
        ) {
            let (client, server) = tokio::io::duplex(4096);
            let (reader, writer) = tokio::io::split(server);
            let peer = SocketAddr::from(([127, 0, 0, 1], 42000 + session_id as u16));
            let mut conn = Connection::new(
                session_id,
                peer,
                reader,
                writer,
                Arc::clone(&self.registry),
                self.broadcast.clone(),
            );
            let task = tokio::spawn(async move {
                let result = conn.run().await;
                (result, conn.state().phase)
            });
            (client, task)
        }
    }

    async fn join(client: &mut DuplexStream, identity: &str) -> bool {
        let request = Message::JoinRequest {
            identity: identity.into(),
            datagram_port: 0,
        };
        write_frame(client, &request).await.unwrap();
        match read_frame(client).await.unwrap() {
            Some(Message::JoinResponse { available }) => available,
            other => panic!("expected join response, got {:?}", other),
        }
    }

    async fn next_chat(client: &mut DuplexStream) -> ChatMessage {
        let frame = tokio::time::timeout(Duration::from_secs(2), read_frame(client))
            .await
            .expect("timed out")
            .unwrap();
        match frame {
            Some(Message::Chat(chat)) => chat,
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accept_and_announce() {
        let harness = Harness::new();
        let (mut alice, _task) = harness.connect(1);

        assert!(join(&mut alice, "alice").await);
        assert_eq!(next_chat(&mut alice).await, ChatMessage::joined("alice"));
        assert!(harness.registry.contains("alice").await);
    }

    #[tokio::test]
    async fn test_reject_duplicate() {
        let harness = Harness::new();
        let (mut first, _t1) = harness.connect(1);
        assert!(join(&mut first, "alice").await);

        let (mut second, t2) = harness.connect(2);
        assert!(!join(&mut second, "alice").await);

        let (result, phase) = t2.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(phase, SessionPhase::Rejected);
        // Server closed the stream after answering
        assert!(read_frame(&mut second).await.unwrap().is_none());
        assert_eq!(harness.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_and_announces() {
        let harness = Harness::new();
        let (mut bob, _tb) = harness.connect(1);
        assert!(join(&mut bob, "bob").await);
        assert_eq!(next_chat(&mut bob).await.body, "bob joined the chat!");

        let (mut alice, ta) = harness.connect(2);
        assert!(join(&mut alice, "alice").await);
        assert_eq!(next_chat(&mut bob).await.body, "alice joined the chat!");

        // Ungraceful: drop the stream without any goodbye
        drop(alice);
        let (result, phase) = ta.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(phase, SessionPhase::Closed);

        assert_eq!(next_chat(&mut bob).await, ChatMessage::left("alice"));
        assert!(!harness.registry.contains("alice").await);

        // Identity is immediately reusable
        let (mut again, _t) = harness.connect(3);
        assert!(join(&mut again, "alice").await);
        assert_eq!(next_chat(&mut bob).await.body, "alice joined the chat!");
    }

    #[tokio::test]
    async fn test_chat_relayed_with_registered_sender() {
        let harness = Harness::new();
        let (mut alice, _ta) = harness.connect(1);
        assert!(join(&mut alice, "alice").await);
        next_chat(&mut alice).await;

        let spoofed = Message::Chat(ChatMessage::new("mallory", "hello"));
        write_frame(&mut alice, &spoofed).await.unwrap();

        assert_eq!(next_chat(&mut alice).await, ChatMessage::new("alice", "hello"));
    }

    #[tokio::test]
    async fn test_oversized_chat_after_rewrite_dropped() {
        let harness = Harness::new();
        let (mut alice, _ta) = harness.connect(1);
        assert!(join(&mut alice, "alice").await);
        next_chat(&mut alice).await;

        // Fits exactly with an empty sender, overflows once stamped "alice"
        let body = "x".repeat(MAX_FRAME_SIZE - 7);
        let spoofed = Message::Chat(ChatMessage::new("", body));
        write_frame(&mut alice, &spoofed).await.unwrap();
        write_frame(&mut alice, &Message::Chat(ChatMessage::new("alice", "ok")))
            .await
            .unwrap();

        assert_eq!(next_chat(&mut alice).await, ChatMessage::new("alice", "ok"));
        assert!(harness.registry.contains("alice").await);
    }

    #[tokio::test]
    async fn test_chat_before_join_is_error() {
        let harness = Harness::new();
        let (mut client, task) = harness.connect(1);

        let chat = Message::Chat(ChatMessage::new("alice", "too early"));
        write_frame(&mut client, &chat).await.unwrap();

        let (result, phase) = task.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::UnexpectedMessage(_)))
        ));
        assert_eq!(phase, SessionPhase::AwaitingHandshake);
        assert!(harness.registry.is_empty().await);
    }
}
