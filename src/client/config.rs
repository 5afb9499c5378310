//! Client configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::server::config::DEFAULT_PORT;

/// Default multicast group
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);

/// Default multicast port
pub const DEFAULT_MULTICAST_PORT: u16 = 8888;

/// Default multicast hop limit
pub const DEFAULT_MULTICAST_TTL: u32 = 2;

/// Multicast group membership options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastConfig {
    /// Group address
    pub group: Ipv4Addr,

    /// Group port
    pub port: u16,

    /// Local interface address to join on (unspecified = OS choice)
    pub interface: Ipv4Addr,

    /// Hop limit for outgoing datagrams
    pub ttl: u32,

    /// Deliver our own multicast datagrams to local listeners
    pub loopback: bool,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: DEFAULT_MULTICAST_TTL,
            loopback: true,
        }
    }
}

impl MulticastConfig {
    /// Group address and port
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::from((self.group, self.port))
    }

    /// Set the interface to join on
    pub fn interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    /// Set the group port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chat server address
    pub server_addr: SocketAddr,

    /// Datagram relay address
    pub relay_addr: SocketAddr,

    /// Multicast membership (`None` disables multicast)
    pub multicast: Option<MulticastConfig>,

    /// File sent by the payload commands
    pub payload_path: PathBuf,

    /// Consecutive malformed chat frames tolerated before disconnecting
    pub max_decode_errors: u32,

    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            relay_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            multicast: Some(MulticastConfig::default()),
            payload_path: PathBuf::from("ascii.txt"),
            max_decode_errors: 8,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given server
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Default::default()
        }
    }

    /// Set the relay address
    pub fn relay(mut self, addr: SocketAddr) -> Self {
        self.relay_addr = addr;
        self
    }

    /// Set multicast options
    pub fn multicast(mut self, config: MulticastConfig) -> Self {
        self.multicast = Some(config);
        self
    }

    /// Do not join any multicast group
    pub fn disable_multicast(mut self) -> Self {
        self.multicast = None;
        self
    }

    /// Set the payload file
    pub fn payload_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload_path = path.into();
        self
    }

    /// Set the decode error tolerance
    pub fn max_decode_errors(mut self, max: u32) -> Self {
        self.max_decode_errors = max;
        self
    }
}
