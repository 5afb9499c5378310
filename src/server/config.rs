//! Server configuration

use std::net::SocketAddr;

/// Default stream and relay port
pub const DEFAULT_PORT: u16 = 8080;

/// Default broadcast queue capacity
pub const DEFAULT_BROADCAST_CAPACITY: usize = 10;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the chat stream listener binds to
    pub bind_addr: SocketAddr,

    /// Address the datagram relay binds to
    pub relay_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Messages the broadcast queue holds before enqueuers wait
    pub broadcast_capacity: usize,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            relay_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the relay address
    pub fn relay(mut self, addr: SocketAddr) -> Self {
        self.relay_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set broadcast queue capacity (at least 1)
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.relay_addr.port(), 8080);
        assert!(config.relay_addr.ip().is_loopback());
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.broadcast_capacity, 10);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.relay_addr.port(), 8080);
    }

    #[test]
    fn test_builder_capacity_floor() {
        let config = ServerConfig::default().broadcast_capacity(0);
        assert_eq!(config.broadcast_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .relay(addr)
            .max_connections(50)
            .broadcast_capacity(64);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.relay_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.broadcast_capacity, 64);
    }
}
