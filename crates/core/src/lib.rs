//! Epidemic gossip dissemination simulator.
//!
//! A run builds a random directed topology, repairs it so a rumor injected at
//! the right vertex can reach everyone, then runs one gossip endpoint per
//! vertex on a shared event loop until every endpoint has seen the rumor.

/// Simulation configuration, validation and logger setup.
pub mod config;

/// Random topology generation and connectivity repair.
pub mod graph;

/// Per-vertex gossip endpoint.
pub mod node;

/// Console summary and JSON export of a finished run.
pub mod report;

/// Orchestration of a whole run plus the seeded RNG shared by its parts.
pub mod simulation;

/// Tracing and logging infrastructure.
pub mod tracing;

/// Datagram sockets (UDP and in-memory) and vertex addressing.
pub mod transport;

pub use graph::{Graph, Repair, Vertex};
pub use node::{NodeHandle, NodeSnapshot, NodeState, NodeStats};
pub use simulation::{Simulation, SimulationError, SimulationRng, Simulator};
