//! Registration entries
//!
//! A [`ClientHandle`] is the server's only way to reach a registered client:
//! its stream writer for fan-out and its datagram endpoint for the relay.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::protocol::{write_frame, Message};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cheaply cloneable handle to one live connection
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    session_id: u64,
    identity: String,
    peer_addr: SocketAddr,
    datagram_addr: SocketAddr,
    writer: Mutex<BoxedWriter>,
}

impl ClientHandle {
    /// Create a handle around the write half of a connection.
    ///
    /// `datagram_port` is the port the client declared in its join request;
    /// 0 falls back to the remote stream port.
    pub fn new<W>(
        session_id: u64,
        identity: impl Into<String>,
        peer_addr: SocketAddr,
        datagram_port: u16,
        writer: W,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let port = if datagram_port == 0 {
            peer_addr.port()
        } else {
            datagram_port
        };

        Self {
            inner: Arc::new(HandleInner {
                session_id,
                identity: identity.into(),
                peer_addr,
                datagram_addr: SocketAddr::new(peer_addr.ip(), port),
                writer: Mutex::new(Box::new(writer)),
            }),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.inner.session_id
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// Where relayed datagrams for this client are sent
    pub fn datagram_addr(&self) -> SocketAddr {
        self.inner.datagram_addr
    }

    /// Encode and write one frame to the client
    pub async fn send(&self, msg: &Message) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        write_frame(&mut *writer, msg).await
    }

    /// Take exclusive use of the writer.
    ///
    /// The connection handler holds this across registration and the join
    /// response so no broadcast can reach the client first.
    pub(crate) async fn lock_writer(&self) -> MutexGuard<'_, BoxedWriter> {
        self.inner.writer.lock().await
    }

    /// Shut down the write half
    pub async fn shutdown(&self) {
        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(
                session_id = self.inner.session_id,
                error = %e,
                "Writer shutdown failed"
            );
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("session_id", &self.inner.session_id)
            .field("identity", &self.inner.identity)
            .field("peer_addr", &self.inner.peer_addr)
            .field("datagram_addr", &self.inner.datagram_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_frame, ChatMessage};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_declared_datagram_port() {
        let (w, _r) = tokio::io::duplex(64);
        let handle = ClientHandle::new(1, "alice", addr(40000), 50000, w);
        assert_eq!(handle.datagram_addr(), addr(50000));
    }

    #[test]
    fn test_derived_datagram_port() {
        let (w, _r) = tokio::io::duplex(64);
        let handle = ClientHandle::new(1, "alice", addr(40000), 0, w);
        assert_eq!(handle.datagram_addr(), addr(40000));
    }

    #[tokio::test]
    async fn test_send() {
        let (w, mut r) = tokio::io::duplex(1024);
        let handle = ClientHandle::new(7, "bob", addr(40001), 0, w);

        let msg = Message::Chat(ChatMessage::new("alice", "hi"));
        handle.send(&msg).await.unwrap();

        assert_eq!(read_frame(&mut r).await.unwrap(), Some(msg));
    }
}
