use std::{io, net::SocketAddr};

use bytes::Bytes;
use tokio::time::Instant;

use super::SimulationRng;
use crate::{
    config::{ConfigError, SeedTarget, SimulationConfig},
    graph::{Graph, Repair, Vertex},
    node::{GossipNode, NodeConfig, NodeError, NodeHandle, NodeSnapshot},
    transport::{Network, PortMap, UdpNetwork},
};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed binding node {vertex} on {addr}: {source}")]
    Bind {
        vertex: Vertex,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("vertex {0} is not part of the topology")]
    UnknownVertex(Vertex),
}

/// Builds and starts simulation runs for one configuration.
#[derive(Debug, Clone)]
pub struct Simulator<N = UdpNetwork> {
    config: SimulationConfig,
    network: N,
}

impl Simulator<UdpNetwork> {
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        Self::with_network(config, UdpNetwork)
    }
}

impl<N: Network> Simulator<N> {
    pub fn with_network(config: SimulationConfig, network: N) -> Result<Self, SimulationError> {
        config.validate()?;
        tracing::info!(
            num_nodes = config.num_nodes,
            num_neighbors = config.num_neighbors,
            period = ?config.period,
            fanout = config.fanout,
            "Initializing simulator"
        );
        Ok(Self { config, network })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn root_rng(&self) -> SimulationRng {
        match self.config.rng_seed {
            Some(seed) => SimulationRng::new(seed),
            None => SimulationRng::from_clock(),
        }
    }

    /// Builds the topology and spawns one node per vertex.
    ///
    /// Nodes start listening and ticking immediately. Nobody holds the rumor
    /// yet: use [`Simulation::seed`] or inject a datagram from outside.
    pub async fn start(&self) -> Result<Simulation, SimulationError> {
        let root = self.root_rng();
        tracing::debug!(seed = root.seed(), "Building topology");

        let mut graph_rng = root.child_with_index(0);
        let mut graph = Graph::generate(
            self.config.num_nodes,
            self.config.num_neighbors,
            &mut graph_rng,
        );
        let repair = graph.make_connected();

        let ports = PortMap::new(self.config.first_port);
        let mut nodes = Vec::with_capacity(graph.len());
        for vertex in graph.vertices() {
            let addr = ports.addr(vertex);
            let config = NodeConfig {
                vertex,
                addr,
                neighbors: graph.adjacents(vertex).iter().map(|&a| ports.addr(a)).collect(),
                period: self.config.period,
                fanout: self.config.fanout,
                rng: root.child_with_index(u64::from(vertex)),
            };
            let node = GossipNode::spawn(&self.network, config)
                .await
                .map_err(|source| SimulationError::Bind {
                    vertex,
                    addr,
                    source,
                })?;
            nodes.push(node);
        }

        Ok(Simulation {
            graph,
            repair,
            ports,
            nodes,
            started_at: Instant::now(),
        })
    }

    /// Starts a run, seeds `rumor` into `target` and waits until every node
    /// has received it.
    pub async fn run(
        &self,
        target: SeedTarget,
        rumor: impl Into<Bytes>,
    ) -> Result<Simulation, SimulationError> {
        let simulation = self.start().await?;
        simulation.seed(target, rumor)?;
        simulation.run_to_completion().await?;
        Ok(simulation)
    }
}

/// A started run: its topology and its live nodes.
///
/// Dropping it stops every node.
#[derive(Debug)]
pub struct Simulation {
    graph: Graph,
    repair: Repair,
    ports: PortMap,
    nodes: Vec<NodeHandle>,
    started_at: Instant,
}

impl Simulation {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn repair(&self) -> &Repair {
        &self.repair
    }

    pub fn ports(&self) -> PortMap {
        self.ports
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Nodes in ascending vertex order.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn node(&self, vertex: Vertex) -> Option<&NodeHandle> {
        let index = usize::try_from(vertex).ok()?.checked_sub(1)?;
        self.nodes.get(index)
    }

    /// Vertex from which the rumor reaches every other vertex.
    pub fn origin(&self) -> Option<Vertex> {
        self.repair.origin()
    }

    /// Hands the rumor to the chosen node and returns its vertex.
    pub fn seed(
        &self,
        target: SeedTarget,
        rumor: impl Into<Bytes>,
    ) -> Result<Vertex, SimulationError> {
        let vertex = match target {
            SeedTarget::Origin => self.origin().ok_or(SimulationError::UnknownVertex(0))?,
            SeedTarget::Vertex(vertex) => vertex,
        };
        let node = self
            .node(vertex)
            .ok_or(SimulationError::UnknownVertex(vertex))?;
        node.seed(rumor)?;
        tracing::info!(vertex, addr = %node.addr(), "Seeded rumor");
        Ok(vertex)
    }

    pub fn all_received(&self) -> bool {
        self.nodes.iter().all(|node| node.stats().num_received > 0)
    }

    /// Waits until every node reports at least one receipt.
    ///
    /// Nodes keep running afterwards; only this wait ends.
    pub async fn run_to_completion(&self) -> Result<(), SimulationError> {
        for node in &self.nodes {
            node.received().await?;
        }
        tracing::info!(
            nodes = self.nodes.len(),
            elapsed = ?self.started_at.elapsed(),
            "Rumor reached every node"
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes.iter().map(NodeHandle::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::InMemoryNetwork;

    fn simulator(config: SimulationConfig) -> Simulator<InMemoryNetwork> {
        Simulator::with_network(config, InMemoryNetwork::new()).unwrap()
    }

    #[test]
    fn rejects_invalid_config_before_starting() {
        let err = Simulator::with_network(
            SimulationConfig::new(3, 2).with_fanout(3),
            InMemoryNetwork::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SimulationError::Config(ConfigError::Fanout { .. })));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn wires_nodes_to_adjacency() {
        let config = SimulationConfig::new(8, 3).with_rng_seed(21);
        let simulation = simulator(config).start().await.unwrap();

        assert_eq!(simulation.nodes().len(), 8);
        let ports = simulation.ports();
        for node in simulation.nodes() {
            assert_eq!(ports.vertex(node.addr()), node.vertex());
            let expected: Vec<_> = simulation
                .graph()
                .adjacents(node.vertex())
                .iter()
                .map(|&a| ports.addr(a))
                .collect();
            assert_eq!(node.neighbors(), expected.as_slice());
        }
        assert!(simulation.node(0).is_none());
        assert!(simulation.node(9).is_none());
        assert_eq!(simulation.node(8).map(NodeHandle::vertex), Some(8));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn fixed_seed_reproduces_topology() {
        let config = SimulationConfig::new(12, 2).with_rng_seed(5);
        let a = simulator(config.clone()).start().await.unwrap();
        let b = simulator(config).start().await.unwrap();
        assert_eq!(a.graph(), b.graph());
        assert_eq!(a.repair(), b.repair());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn bind_failure_aborts_the_run() {
        let network = InMemoryNetwork::new();
        let taken = PortMap::new(crate::config::FIRST_PORT).addr(2);
        let _guard = network.bind(taken).await.unwrap();

        let err = Simulator::with_network(SimulationConfig::new(3, 1), network)
            .unwrap()
            .start()
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::Bind { vertex: 2, .. }));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn seeding_unknown_vertex_fails() {
        let simulation = simulator(SimulationConfig::new(3, 1)).start().await.unwrap();
        let err = simulation
            .seed(SeedTarget::Vertex(4), &b"rumor"[..])
            .unwrap_err();
        assert!(matches!(err, SimulationError::UnknownVertex(4)));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn seeded_origin_reaches_everyone() {
        let config = SimulationConfig::new(20, 2)
            .with_fanout(1)
            .with_period(Duration::from_millis(50))
            .with_rng_seed(1234);
        let simulation = simulator(config).start().await.unwrap();
        assert!(!simulation.all_received());

        let origin = simulation.seed(SeedTarget::Origin, &b"rumor"[..]).unwrap();
        assert_eq!(Some(origin), simulation.origin());
        simulation.run_to_completion().await.unwrap();
        assert!(simulation.all_received());
    }
}
