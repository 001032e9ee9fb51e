//! In-memory datagram network for tests.
//!
//! Every [`InMemoryNetwork`] is an isolated registry of bound addresses; a
//! send looks up the target's inbox and pushes the datagram into it. Delivery
//! is immediate, lossless and in order. Sending to an address nobody bound
//! fails with `ConnectionRefused`, like an ICMP port unreachable would.

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use super::{Network, Socket};

type Datagram = (Bytes, SocketAddr);

#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    sockets: Arc<DashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
    delivered: Arc<AtomicU64>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, addr: &SocketAddr) -> bool {
        self.sockets.contains_key(addr)
    }

    /// Datagrams handed to a bound socket so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNetwork")
            .field("bound", &self.sockets.len())
            .field("delivered", &self.delivered())
            .finish()
    }
}

impl Network for InMemoryNetwork {
    type Socket = InMemorySocket;

    async fn bind(&self, addr: SocketAddr) -> io::Result<InMemorySocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.sockets.entry(addr) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("{addr} already bound"),
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }
        Ok(InMemorySocket {
            addr,
            inbox: Mutex::new(rx),
            network: self.clone(),
        })
    }
}

/// A socket bound on an [`InMemoryNetwork`]. Unbinds itself on drop.
pub struct InMemorySocket {
    addr: SocketAddr,
    inbox: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    network: InMemoryNetwork,
}

impl InMemorySocket {
    /// Pops a pending datagram without waiting.
    pub fn try_recv(&self) -> Option<Datagram> {
        self.inbox.try_lock().ok()?.try_recv().ok()
    }
}

impl Socket for InMemorySocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        let (data, from) = inbox
            .recv()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, from))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let inbox = self
            .network
            .sockets
            .get(&target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("nothing bound at {target}"),
                )
            })?;
        inbox
            .send((Bytes::copy_from_slice(buf), self.addr))
            .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        self.network.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

impl Drop for InMemorySocket {
    fn drop(&mut self) {
        self.network.sockets.remove(&self.addr);
    }
}
