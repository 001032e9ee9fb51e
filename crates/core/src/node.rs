//! Gossip endpoint, one per vertex.
//!
//! Each node runs as its own task and is the only writer of its state. The
//! task waits on three things at once: an inbound datagram, a rumor seeded
//! through its [`NodeHandle`], and the next tick of its forwarding timer.
//!
//! A node starts `Idle`. The first rumor it receives (or is seeded with) moves
//! it to `Propagating` for good. On every tick it counts a round; if it holds
//! a rumor it also sends it to `fanout` neighbors picked uniformly at random,
//! one send after the other. Transport errors are logged and never stop the
//! node.
//!
//! The sends of a tick are awaited inside the loop, so a datagram or seed
//! arriving meanwhile is only picked up once they finish and gets a slightly
//! later `first_received_at`. Sends on loopback UDP and on the in-memory
//! network complete without waiting, which keeps that delay negligible.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    graph::Vertex,
    simulation::SimulationRng,
    transport::{Network, Socket, MAX_RECEIVE_BYTES},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No rumor held yet.
    Idle,
    /// Holding a rumor and forwarding it every tick.
    Propagating,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Set on the first receipt and never touched again.
    pub first_received_at: Option<Instant>,
    pub num_received: u64,
    /// Completed ticks, whether or not anything was sent.
    pub num_sent: u64,
}

impl NodeStats {
    pub fn state(&self) -> NodeState {
        if self.first_received_at.is_some() {
            NodeState::Propagating
        } else {
            NodeState::Idle
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node {0} stopped")]
    Stopped(SocketAddr),
}

/// Construction parameters of a [`GossipNode`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub vertex: Vertex,
    pub addr: SocketAddr,
    pub neighbors: Vec<SocketAddr>,
    pub period: Duration,
    pub fanout: usize,
    pub rng: SimulationRng,
}

/// Everything reporting needs to know about a node at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub vertex: Vertex,
    pub addr: SocketAddr,
    pub neighbors: Vec<SocketAddr>,
    pub stats: NodeStats,
}

pub struct GossipNode<S> {
    socket: S,
    addr: SocketAddr,
    neighbors: Arc<[SocketAddr]>,
    period: Duration,
    fanout: usize,
    rng: SimulationRng,
    rumor: Option<Bytes>,
    stats: NodeStats,
    stats_tx: watch::Sender<NodeStats>,
    seeds: mpsc::UnboundedReceiver<Bytes>,
}

impl<S: Socket> GossipNode<S> {
    /// Binds the node's socket on `network` and starts its task.
    ///
    /// The node listens right away; its first tick fires one `period` later.
    pub async fn spawn<N>(network: &N, config: NodeConfig) -> io::Result<NodeHandle>
    where
        N: Network<Socket = S>,
    {
        if config.period.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "gossip period must be greater than zero",
            ));
        }
        let socket = network.bind(config.addr).await?;
        let addr = socket.local_addr()?;
        let neighbors: Arc<[SocketAddr]> = config.neighbors.into();
        let (stats_tx, stats_rx) = watch::channel(NodeStats::default());
        let (seed_tx, seed_rx) = mpsc::unbounded_channel();

        tracing::info!(
            %addr,
            neighbors = ?neighbors,
            period = ?config.period,
            fanout = config.fanout,
            "Node started"
        );

        let node = GossipNode {
            socket,
            addr,
            neighbors: neighbors.clone(),
            period: config.period,
            fanout: config.fanout,
            rng: config.rng,
            rumor: None,
            stats: NodeStats::default(),
            stats_tx,
            seeds: seed_rx,
        };
        let task = tokio::spawn(node.run());

        Ok(NodeHandle {
            vertex: config.vertex,
            addr,
            neighbors,
            stats: stats_rx,
            seeds: seed_tx,
            task,
        })
    }

    async fn run(mut self) {
        let mut buf = vec![0u8; MAX_RECEIVE_BYTES];
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        self.receive(Bytes::copy_from_slice(&buf[..len]), Some(from));
                    }
                    Err(err) => {
                        tracing::warn!(addr = %self.addr, %err, "Failed receiving datagram");
                    }
                },
                Some(rumor) = self.seeds.recv() => self.receive(rumor, None),
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    fn receive(&mut self, rumor: Bytes, from: Option<SocketAddr>) {
        if self.stats.first_received_at.is_none() {
            self.stats.first_received_at = Some(Instant::now());
            tracing::debug!(addr = %self.addr, from = ?from, "First receipt of the rumor");
        }
        self.stats.num_received += 1;
        self.rumor = Some(rumor);
        self.publish();
    }

    async fn tick(&mut self) {
        if let Some(rumor) = self.rumor.clone() {
            let targets = self.rng.sample(&self.neighbors, self.fanout);
            tracing::debug!(addr = %self.addr, targets = ?targets, "Fanout");
            for target in targets {
                if let Err(err) = self.socket.send_to(&rumor, target).await {
                    tracing::warn!(addr = %self.addr, %target, %err, "Failed sending rumor");
                }
            }
        }
        self.stats.num_sent += 1;
        self.publish();
    }

    fn publish(&self) {
        self.stats_tx.send_replace(self.stats);
    }
}

/// Owner's view of a running node. Dropping it stops the node and releases
/// its socket.
#[derive(Debug)]
pub struct NodeHandle {
    vertex: Vertex,
    addr: SocketAddr,
    neighbors: Arc<[SocketAddr]>,
    stats: watch::Receiver<NodeStats>,
    seeds: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn neighbors(&self) -> &[SocketAddr] {
        &self.neighbors
    }

    pub fn stats(&self) -> NodeStats {
        *self.stats.borrow()
    }

    pub fn state(&self) -> NodeState {
        self.stats().state()
    }

    /// Hands the node a rumor as if it had arrived from the network.
    pub fn seed(&self, rumor: impl Into<Bytes>) -> Result<(), NodeError> {
        self.seeds
            .send(rumor.into())
            .map_err(|_| NodeError::Stopped(self.addr))
    }

    /// A receiver that observes every stats update of the node.
    pub fn subscribe(&self) -> watch::Receiver<NodeStats> {
        self.stats.clone()
    }

    /// Resolves once the node has received the rumor at least once.
    pub async fn received(&self) -> Result<NodeStats, NodeError> {
        let mut stats = self.subscribe();
        let current = stats
            .wait_for(|s| s.num_received > 0)
            .await
            .map(|s| *s)
            .map_err(|_| NodeError::Stopped(self.addr))?;
        Ok(current)
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            vertex: self.vertex,
            addr: self.addr,
            neighbors: self.neighbors.to_vec(),
            stats: self.stats(),
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
