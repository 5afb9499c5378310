//! Multicast socket setup
//!
//! Sockets are built with socket2 for the options tokio does not expose:
//! address reuse (several clients on one host share the group port) and the
//! outgoing multicast interface.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::config::MulticastConfig;

/// Bind the group port and join the group
pub fn bind_receiver(config: &MulticastConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // Allow address reuse
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&config.group, &config.interface)?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket)?;

    tracing::info!(
        group = %config.group,
        port = config.port,
        interface = %config.interface,
        "Joined multicast group"
    );

    Ok(socket)
}

/// Socket for sending to the group with the configured hop limit
pub fn bind_sender(config: &MulticastConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_multicast_loop_v4(config.loopback)?;
    if !config.interface.is_unspecified() {
        socket.set_multicast_if_v4(&config.interface)?;
    }

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&bind_addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}
