//! UDP socket management: bind, broadcast-capable send, and receive.

use crate::error::TransportError;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

/// A bound UDP socket. Broadcast is enabled unconditionally at bind time —
/// every caller in this crate either broadcasts a command or unicasts one,
/// and `SO_BROADCAST` has no effect on unicast sends.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::UdpBind { addr, source })?;
        socket.set_broadcast(true).map_err(TransportError::UdpSocketOption)?;
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::UdpSocketOption)
    }

    pub async fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(bytes, addr)
            .await
            .map(|_| ())
            .map_err(|source| TransportError::UdpSend { addr, source })
    }

    /// Receives one datagram. The returned buffer is trimmed to the number
    /// of bytes actually received.
    pub async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; 64 * 1024];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::UdpRecv)?;
        buf.truncate(len);
        Ok((buf, addr))
    }
}

/// Computes the subnet broadcast address for an IPv4 CIDR, e.g.
/// `192.168.1.0/24` -> `192.168.1.255`.
pub fn broadcast_address(network: Ipv4Addr, prefix_len: u8) -> Result<Ipv4Addr, TransportError> {
    if prefix_len > 32 {
        return Err(TransportError::UdpBind {
            addr: SocketAddr::new(network.into(), 0),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "prefix length > 32"),
        });
    }
    let host_bits = 32 - prefix_len as u32;
    let mask: u32 = if host_bits == 32 { 0 } else { !0u32 << host_bits };
    let network_addr = u32::from(network) & mask;
    let broadcast = network_addr | !mask;
    Ok(Ipv4Addr::from(broadcast))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_address_slash_24() {
        let bcast = broadcast_address(Ipv4Addr::new(192, 168, 1, 0), 24).unwrap();
        assert_eq!(bcast, Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn broadcast_address_slash_16() {
        let bcast = broadcast_address(Ipv4Addr::new(10, 0, 0, 0), 16).unwrap();
        assert_eq!(bcast, Ipv4Addr::new(10, 0, 255, 255));
    }

    #[test]
    fn broadcast_address_slash_32_is_the_host_itself() {
        let bcast = broadcast_address(Ipv4Addr::new(10, 1, 2, 3), 32).unwrap();
        assert_eq!(bcast, Ipv4Addr::new(10, 1, 2, 3));
    }
}
