//! Rendering of a finished run.
//!
//! [`Summary`] prints per-node latency relative to the earliest receipt plus
//! run-wide aggregates. [`JsonReport`] is a node-link document (`nodes`,
//! `links`) where each node carries how many gossip rounds it sat out
//! compared to the busiest node, which makes the spread replayable.

use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    net::SocketAddr,
    path::Path,
    time::Duration,
};

use serde::Serialize;

use crate::{graph::Vertex, node::NodeSnapshot, transport::PortMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLine {
    pub vertex: Vertex,
    pub addr: SocketAddr,
    /// Time between the earliest receipt in the run and this node's first one.
    pub latency: Option<Duration>,
    pub num_received: u64,
    pub num_sent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub nodes: Vec<NodeLine>,
    pub avg_latency: Duration,
    pub max_latency: Duration,
    /// Most ticks any node went through.
    pub rounds: u64,
}

impl Summary {
    pub fn new(snapshots: &[NodeSnapshot]) -> Self {
        let receipts = snapshots.iter().filter_map(|s| s.stats.first_received_at);
        let earliest = receipts.clone().min();
        let latest = receipts.max();

        let nodes: Vec<NodeLine> = snapshots
            .iter()
            .map(|s| NodeLine {
                vertex: s.vertex,
                addr: s.addr,
                latency: s
                    .stats
                    .first_received_at
                    .zip(earliest)
                    .map(|(at, earliest)| at.duration_since(earliest)),
                num_received: s.stats.num_received,
                num_sent: s.stats.num_sent,
            })
            .collect();

        let latencies: Vec<Duration> = nodes.iter().filter_map(|n| n.latency).collect();
        let avg_latency = match u32::try_from(latencies.len()) {
            Ok(count) if count > 0 => latencies.iter().sum::<Duration>() / count,
            _ => Duration::ZERO,
        };
        let max_latency = earliest
            .zip(latest)
            .map(|(earliest, latest)| latest.duration_since(earliest))
            .unwrap_or_default();
        let rounds = nodes.iter().map(|n| n.num_sent).max().unwrap_or(0);

        Self {
            nodes,
            avg_latency,
            max_latency,
            rounds,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let port = node.addr.port();
            match node.latency {
                Some(latency) => write!(f, "{port}: latency={}ms", latency.as_millis())?,
                None => write!(f, "{port}: latency=-")?,
            }
            writeln!(f, ", received={}, sent={}", node.num_received, node.num_sent)?;
        }
        writeln!(f, "---")?;
        writeln!(f, "Avg. latency: {}ms", self.avg_latency.as_millis())?;
        writeln!(f, "Max. latency: {}ms", self.max_latency.as_millis())?;
        write!(f, "Rounds of gossip: {}", self.rounds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonNode {
    pub id: String,
    /// Rounds between this node's last tick and the busiest node's last tick.
    pub iterations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonLink {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonReport {
    pub nodes: Vec<JsonNode>,
    pub links: Vec<JsonLink>,
}

fn node_id(vertex: Vertex) -> String {
    format!("N{vertex}")
}

impl JsonReport {
    pub fn new(snapshots: &[NodeSnapshot], ports: PortMap) -> Self {
        let max_rounds = snapshots.iter().map(|s| s.stats.num_sent).max().unwrap_or(0);

        let mut nodes = Vec::with_capacity(snapshots.len());
        let mut links = Vec::new();
        for snapshot in snapshots {
            let id = node_id(snapshot.vertex);
            links.extend(snapshot.neighbors.iter().map(|&neighbor| JsonLink {
                source: id.clone(),
                target: node_id(ports.vertex(neighbor)),
            }));
            nodes.push(JsonNode {
                id,
                iterations: max_rounds.saturating_sub(snapshot.stats.num_sent),
            });
        }

        Self { nodes, links }
    }

    pub fn write(&self, writer: impl Write) -> io::Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()
    }
}
