use std::{fmt, path::PathBuf, str::FromStr, sync::atomic::AtomicBool, time::Duration};

use crate::graph::Vertex;

/// First port handed out to a vertex (start of the IANA dynamic range).
pub const FIRST_PORT: u16 = 49152;
/// Last usable port.
pub const LAST_PORT: u16 = u16::MAX;
/// Maximum number of nodes that fit between [`FIRST_PORT`] and [`LAST_PORT`].
pub const MAX_NODES: usize = (LAST_PORT - FIRST_PORT) as usize;

/// Default interval between two gossip rounds of a node.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
/// Default number of neighbors a node forwards to per round.
pub const DEFAULT_FANOUT: usize = 1;
/// Payload used when the rumor is not given explicitly.
pub const DEFAULT_MESSAGE: &str = "Hello, world!";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("number of nodes must be between 1 and {max}, got {actual}")]
    NumNodes { actual: usize, max: usize },
    #[error("number of neighbors must be between 1 and number of nodes ({num_nodes}), got {actual}")]
    NumNeighbors { actual: usize, num_nodes: usize },
    #[error("fanout must be between 1 and number of neighbors ({num_neighbors}), got {actual}")]
    Fanout { actual: usize, num_neighbors: usize },
    #[error("gossip period must be greater than zero")]
    ZeroPeriod,
    #[error("seed vertex {vertex} is not part of a {num_nodes} node topology")]
    SeedVertex { vertex: Vertex, num_nodes: usize },
}

/// Which vertex receives the rumor when the simulator seeds it itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedTarget {
    /// First vertex of the largest component after repair; reaches everyone.
    Origin,
    Vertex(Vertex),
}

impl FromStr for SeedTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" | "origin" => Ok(SeedTarget::Origin),
            other => other
                .parse::<Vertex>()
                .map(SeedTarget::Vertex)
                .map_err(|_| format!("expected `auto` or a vertex id, got `{other}`")),
        }
    }
}

impl fmt::Display for SeedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedTarget::Origin => write!(f, "auto"),
            SeedTarget::Vertex(v) => write!(f, "{v}"),
        }
    }
}

/// Validated parameters of a single simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub num_nodes: usize,
    pub num_neighbors: usize,
    pub period: Duration,
    pub fanout: usize,
    /// Where to write the JSON export, if anywhere.
    pub output_path: Option<PathBuf>,
    /// Fixed seed for topology and node RNGs; wall clock when absent.
    pub rng_seed: Option<u64>,
    pub first_port: u16,
}

impl SimulationConfig {
    pub fn new(num_nodes: usize, num_neighbors: usize) -> Self {
        Self {
            num_nodes,
            num_neighbors,
            period: DEFAULT_PERIOD,
            fanout: DEFAULT_FANOUT,
            output_path: None,
            rng_seed: None,
            first_port: FIRST_PORT,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_first_port(mut self, first_port: u16) -> Self {
        self.first_port = first_port;
        self
    }

    /// Largest node count addressable from `first_port`.
    pub fn max_nodes(&self) -> usize {
        (LAST_PORT - self.first_port) as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.max_nodes();
        if self.num_nodes == 0 || self.num_nodes > max {
            return Err(ConfigError::NumNodes {
                actual: self.num_nodes,
                max,
            });
        }
        if self.num_neighbors == 0 || self.num_neighbors > self.num_nodes {
            return Err(ConfigError::NumNeighbors {
                actual: self.num_neighbors,
                num_nodes: self.num_nodes,
            });
        }
        if self.fanout == 0 || self.fanout > self.num_neighbors {
            return Err(ConfigError::Fanout {
                actual: self.fanout,
                num_neighbors: self.num_neighbors,
            });
        }
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(())
    }
}

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Total number of nodes.
    #[arg(long, env = "GOSSIP_NUM_NODES")]
    pub num_nodes: usize,

    /// Number of neighbors per node.
    #[arg(long, env = "GOSSIP_NUM_NEIGHBORS")]
    pub num_neighbors: usize,

    /// Gossip interval, e.g. `5s` or `250ms`.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub period: Duration,

    /// Fanout per round of gossip.
    #[arg(long, default_value_t = DEFAULT_FANOUT)]
    pub fanout: usize,

    /// Path to write results as JSON.
    #[arg(long = "json-out")]
    pub json_out: Option<PathBuf>,

    /// Seed the rumor into `auto` (a vertex reaching all others) or a given vertex.
    /// Without it the run waits for an external `inject`.
    #[arg(long)]
    pub seed: Option<SeedTarget>,

    /// Rumor payload used with `--seed`.
    #[arg(long, default_value = DEFAULT_MESSAGE)]
    pub message: String,

    /// Fixed RNG seed for reproducible topologies and fanout choices.
    #[arg(long, env = "GOSSIP_RNG_SEED")]
    pub rng_seed: Option<u64>,

    /// Base port; vertex `v` listens on `first-port + v`.
    #[arg(long, default_value_t = FIRST_PORT)]
    pub first_port: u16,
}

impl ConfigArgs {
    /// Validate the command line arguments and return the run configuration.
    pub fn build(&self) -> Result<SimulationConfig, ConfigError> {
        let config = SimulationConfig {
            num_nodes: self.num_nodes,
            num_neighbors: self.num_neighbors,
            period: self.period,
            fanout: self.fanout,
            output_path: self.json_out.clone(),
            rng_seed: self.rng_seed,
            first_port: self.first_port,
        };
        config.validate()?;
        if let Some(SeedTarget::Vertex(vertex)) = self.seed {
            if vertex == 0 || vertex as usize > config.num_nodes {
                return Err(ConfigError::SeedVertex {
                    vertex,
                    num_nodes: config.num_nodes,
                });
            }
        }
        Ok(config)
    }
}

pub fn set_logger(level: Option<tracing::level_filters::LevelFilter>) {
    #[cfg(feature = "trace")]
    {
        static LOGGER_SET: AtomicBool = AtomicBool::new(false);
        if LOGGER_SET
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::Release,
                std::sync::atomic::Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        if let Err(err) = crate::tracing::tracer::init_tracer(level) {
            eprintln!("failed tracing initialization: {err}");
        }
    }
    #[cfg(not(feature = "trace"))]
    let _ = level;
}
