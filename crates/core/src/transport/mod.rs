//! Datagram transport used by gossip nodes.
//!
//! Nodes are generic over [`Network`], which binds [`Socket`]s. Real runs use
//! [`UdpNetwork`] on the loopback interface; tests use [`InMemoryNetwork`] so
//! that they neither touch real ports nor depend on wall-clock time.
//!
//! A rumor travels as one datagram with no framing of any kind. At most
//! [`MAX_RECEIVE_BYTES`] of a datagram are read.

use std::{
    future::Future,
    io,
    net::{IpAddr, Ipv6Addr, SocketAddr},
};

use tokio::net::UdpSocket;

use crate::{config::FIRST_PORT, graph::Vertex};

mod in_memory_socket;

pub use in_memory_socket::{InMemoryNetwork, InMemorySocket};

/// Receive buffer size; longer datagrams are truncated.
pub const MAX_RECEIVE_BYTES: usize = 1024;

/// Make nodes testable without real sockets.
pub trait Socket: Sized + Send + Sync + 'static {
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Something sockets can be bound on.
pub trait Network: Clone + Send + Sync + 'static {
    type Socket: Socket;

    fn bind(&self, addr: SocketAddr) -> impl Future<Output = io::Result<Self::Socket>> + Send;
}

impl Socket for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.send_to(buf, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.local_addr()
    }
}

/// The host's UDP stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpNetwork;

impl Network for UdpNetwork {
    type Socket = UdpSocket;

    async fn bind(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        UdpSocket::bind(addr).await
    }
}

/// Deterministic mapping between vertices and loopback socket addresses.
///
/// Vertex `v` listens on port `first_port + (v & 0xffff)`; the inverse
/// subtracts `first_port` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    ip: IpAddr,
    first_port: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        Self::new(FIRST_PORT)
    }
}

impl PortMap {
    pub fn new(first_port: u16) -> Self {
        Self {
            ip: IpAddr::V6(Ipv6Addr::LOCALHOST),
            first_port,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    pub fn port(&self, vertex: Vertex) -> u16 {
        self.first_port.wrapping_add((vertex & 0xffff) as u16)
    }

    pub fn addr(&self, vertex: Vertex) -> SocketAddr {
        SocketAddr::new(self.ip, self.port(vertex))
    }

    pub fn vertex_of_port(&self, port: u16) -> Vertex {
        port.wrapping_sub(self.first_port) as Vertex
    }

    pub fn vertex(&self, addr: SocketAddr) -> Vertex {
        self.vertex_of_port(addr.port())
    }
}

/// Sends `payload` once to every target from a socket bound at `from`.
///
/// This is how a rumor enters a run from outside: the first node to get it
/// starts propagating. Returns the bytes written per target.
pub async fn inject<N: Network>(
    network: &N,
    from: SocketAddr,
    targets: &[SocketAddr],
    payload: &[u8],
) -> io::Result<Vec<usize>> {
    let socket = network.bind(from).await?;
    let mut written = Vec::with_capacity(targets.len());
    for &target in targets {
        let num = socket.send_to(payload, target).await?;
        tracing::info!(%target, bytes = num, "Injected rumor");
        written.push(num);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_NODES;

    #[test]
    fn port_mapping_round_trips() {
        let ports = PortMap::default();
        for vertex in 1..=MAX_NODES as Vertex {
            let addr = ports.addr(vertex);
            assert_eq!(ports.vertex(addr), vertex);
            assert_eq!(ports.addr(ports.vertex(addr)), addr);
        }
        assert_eq!(ports.port(1), FIRST_PORT + 1);
        assert_eq!(ports.port(MAX_NODES as Vertex), u16::MAX);
    }

    #[test]
    fn port_mapping_uses_loopback() {
        let addr = PortMap::new(40000).addr(3);
        assert_eq!(addr, "[::1]:40003".parse().unwrap());
        let v4 = PortMap::new(40000).with_ip(IpAddr::from([127, 0, 0, 1]));
        assert_eq!(v4.addr(3), "127.0.0.1:40003".parse().unwrap());
    }

    #[tokio::test]
    async fn inject_reaches_every_target() -> io::Result<()> {
        let network = InMemoryNetwork::new();
        let ports = PortMap::new(40000);
        let a = network.bind(ports.addr(1)).await?;
        let b = network.bind(ports.addr(2)).await?;

        let targets = [a.local_addr()?, b.local_addr()?];
        let written = inject(&network, ports.addr(0), &targets, b"hi").await?;
        assert_eq!(written, vec![2, 2]);
        for socket in [&a, &b] {
            let (data, from) = socket.try_recv().expect("datagram");
            assert_eq!(data.as_ref(), b"hi");
            assert_eq!(from, ports.addr(0));
        }
        // the injecting socket is released again
        assert!(!network.is_bound(&ports.addr(0)));
        Ok(())
    }
}
