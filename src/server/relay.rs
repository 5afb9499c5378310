//! Datagram relay
//!
//! Receives payload datagrams and resends the raw bytes to the datagram
//! endpoint of every registered client. Best effort: nothing is retried,
//! acknowledged or ordered.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::protocol::{decode, Message, MAX_DATAGRAM_SIZE};
use crate::registry::Registry;

/// Stateless UDP rebroadcaster
pub struct DatagramRelay {
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
}

impl DatagramRelay {
    pub fn new(socket: Arc<UdpSocket>, registry: Arc<Registry>) -> Self {
        Self { socket, registry }
    }

    /// Relay forever. Read and write failures skip to the next datagram.
    pub async fn run(self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "Datagram receive failed");
                    continue;
                }
            };

            self.relay(&buf[..len], from).await;
        }
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn relay(&self, datagram: &[u8], from: SocketAddr) {
        match decode(datagram) {
            Ok(Message::Payload(payload)) => {
                tracing::debug!(
                    from = %from,
                    sender = %payload.sender,
                    size = payload.data.len(),
                    "Relaying payload"
                );
            }
            Ok(other) => {
                tracing::warn!(from = %from, kind = other.kind(), "Non-payload datagram skipped");
                return;
            }
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "Malformed datagram skipped");
                return;
            }
        }

        for client in self.registry.snapshot().await {
            let target = client.datagram_addr();
            if let Err(e) = self.socket.send_to(datagram, target).await {
                tracing::warn!(
                    identity = client.identity(),
                    target = %target,
                    error = %e,
                    "Failed to relay datagram"
                );
            }
        }
    }
}
