//! Chat server listener
//!
//! Binds the chat listener and the datagram relay, then runs the accept loop
//! alongside the broadcast worker and the relay task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;
use crate::registry::Registry;
use crate::server::broadcast::{BroadcastEngine, BroadcastSender};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::relay::DatagramRelay;

/// Chat server
pub struct ChatServer {
    config: ServerConfig,
    listener: TcpListener,
    relay_socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    broadcast: BroadcastSender,
    engine: BroadcastEngine,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl ChatServer {
    /// Bind the chat listener and relay socket.
    ///
    /// Failing to bind either is fatal.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let relay_socket = Arc::new(UdpSocket::bind(config.relay_addr).await?);

        let registry = Arc::new(Registry::new());
        let (broadcast, engine) =
            BroadcastEngine::new(Arc::clone(&registry), config.broadcast_capacity);

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        tracing::info!(
            addr = %listener.local_addr()?,
            relay = %relay_socket.local_addr()?,
            "Chat server bound"
        );

        Ok(Self {
            config,
            listener,
            relay_socket,
            registry,
            broadcast,
            engine,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// Address the chat listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Address the datagram relay is bound to
    pub fn relay_addr(&self) -> Result<SocketAddr> {
        Ok(self.relay_socket.local_addr()?)
    }

    /// Get a reference to the identity registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run the server
    ///
    /// This method runs until the process exits.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let ChatServer {
            config,
            listener,
            relay_socket,
            registry,
            broadcast,
            engine,
            next_session_id,
            connection_semaphore,
        } = self;

        let broadcast_handle = engine.spawn();
        let relay_handle = DatagramRelay::new(relay_socket, Arc::clone(&registry)).spawn();

        let acceptor = Acceptor {
            config,
            registry,
            broadcast,
            next_session_id,
            connection_semaphore,
        };

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = acceptor.accept_loop(&listener) => {}
        }

        broadcast_handle.abort();
        relay_handle.abort();
        Ok(())
    }
}

struct Acceptor {
    config: ServerConfig,
    registry: Arc<Registry>,
    broadcast: BroadcastSender,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl Acceptor {
    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit: Option<OwnedSemaphorePermit> = match self.connection_semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let registry = Arc::clone(&self.registry);
        let broadcast = self.broadcast.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let (reader, writer) = socket.into_split();
            let mut connection =
                Connection::new(session_id, peer_addr, reader, writer, registry, broadcast);

            if let Err(e) = connection.run().await {
                tracing::debug!(session_id = session_id, error = %e, "Connection error");
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}
