//! Broadcast engine
//!
//! A bounded queue drained by exactly one worker. Every client therefore sees
//! chat messages in the same order: the order they were enqueued.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{ChatMessage, Message};
use crate::registry::Registry;

/// Enqueue side of the broadcast queue
#[derive(Clone)]
pub struct BroadcastSender {
    tx: mpsc::Sender<ChatMessage>,
}

impl BroadcastSender {
    /// Queue a message for fan-out.
    ///
    /// Waits while the queue is full. Returns `false` only if the engine has
    /// stopped.
    pub async fn enqueue(&self, msg: ChatMessage) -> bool {
        match self.tx.send(msg).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Broadcast engine stopped, message dropped");
                false
            }
        }
    }
}

/// Single consumer that writes each queued message to every registered client
pub struct BroadcastEngine {
    rx: mpsc::Receiver<ChatMessage>,
    registry: Arc<Registry>,
}

impl BroadcastEngine {
    /// Create the engine and its sender
    pub fn new(registry: Arc<Registry>, capacity: usize) -> (BroadcastSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (BroadcastSender { tx }, Self { rx, registry })
    }

    /// Drain the queue until every sender is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.fan_out(msg).await;
        }
        tracing::debug!("Broadcast queue closed");
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn fan_out(&self, msg: ChatMessage) {
        let recipients = self.registry.snapshot().await;
        let msg = Message::Chat(msg);
        let mut delivered = 0usize;

        // Encoded per recipient; a failed write only affects that recipient
        for client in &recipients {
            match client.send(&msg).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        identity = client.identity(),
                        session_id = client.session_id(),
                        error = %e,
                        "Failed to deliver chat message"
                    );
                }
            }
        }

        tracing::debug!(
            recipients = recipients.len(),
            delivered = delivered,
            "Chat message broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::DuplexStream;

    use super::*;
    use crate::protocol::read_frame;
    use crate::registry::ClientHandle;

    async fn register(registry: &Registry, id: u64, identity: &str) -> DuplexStream {
        let (writer, reader) = tokio::io::duplex(4096);
        let peer = SocketAddr::from(([127, 0, 0, 1], 41000 + id as u16));
        assert!(registry.register(ClientHandle::new(id, identity, peer, 0, writer)).await);
        reader
    }

    async fn next_chat(reader: &mut DuplexStream) -> ChatMessage {
        let msg = tokio::time::timeout(Duration::from_secs(2), read_frame(reader))
            .await
            .expect("timed out")
            .unwrap();
        match msg {
            Some(Message::Chat(chat)) => chat,
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fan_out_same_order() {
        let registry = Arc::new(Registry::new());
        let mut alice = register(&registry, 1, "alice").await;
        let mut bob = register(&registry, 2, "bob").await;

        let (sender, engine) = BroadcastEngine::new(Arc::clone(&registry), 10);
        let worker = engine.spawn();

        let first = ChatMessage::new("alice", "first");
        let second = ChatMessage::new("bob", "second");
        assert!(sender.enqueue(first.clone()).await);
        assert!(sender.enqueue(second.clone()).await);

        for reader in [&mut alice, &mut bob] {
            assert_eq!(next_chat(reader).await, first);
            assert_eq!(next_chat(reader).await, second);
        }

        drop(sender);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_stop_fan_out() {
        let registry = Arc::new(Registry::new());
        let gone = register(&registry, 1, "gone").await;
        let mut bob = register(&registry, 2, "bob").await;
        drop(gone);

        let (sender, engine) = BroadcastEngine::new(Arc::clone(&registry), 1);
        let _worker = engine.spawn();

        for i in 0..3 {
            assert!(sender.enqueue(ChatMessage::new("x", format!("msg{}", i))).await);
        }

        for i in 0..3 {
            assert_eq!(next_chat(&mut bob).await.body, format!("msg{}", i));
        }
    }

    #[tokio::test]
    async fn test_enqueue_after_stop() {
        let registry = Arc::new(Registry::new());
        let (sender, engine) = BroadcastEngine::new(registry, 1);
        drop(engine);

        assert!(!sender.enqueue(ChatMessage::new("x", "y")).await);
    }
}
