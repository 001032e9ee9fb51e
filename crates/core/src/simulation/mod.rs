//! Running a whole gossip simulation.
//!
//! # Architecture
//!
//! - **Graph**: random topology, repaired so [`Repair::origin`](crate::Repair::origin)
//!   reaches every vertex
//! - **PortMap**: vertex `v` becomes endpoint `first_port + v`
//! - **GossipNode**: one task per vertex, wired to its adjacency as neighbors
//! - **SimulationRng**: a root RNG per run, with one derived child per vertex
//!
//! All node tasks live on whatever tokio runtime drives the [`Simulation`].
//! The binary uses a current-thread runtime, so the whole run is a single
//! cooperative event loop: node callbacks interleave in the order their
//! timers expire and their datagrams arrive, and nothing runs in parallel.
//!
//! # Usage
//!
//! ```ignore
//! use gossip_sim::{config::{SeedTarget, SimulationConfig}, Simulator};
//!
//! let config = SimulationConfig::new(50, 3).with_fanout(2);
//! let simulation = Simulator::new(config)?.start().await?;
//! simulation.seed(SeedTarget::Origin, "Hello, world!")?;
//! simulation.run_to_completion().await?;
//! for node in simulation.snapshot() {
//!     println!("{}: {:?}", node.addr, node.stats);
//! }
//! ```

mod rng;
mod simulator;

pub use rng::SimulationRng;
pub use simulator::{Simulation, SimulationError, Simulator};
