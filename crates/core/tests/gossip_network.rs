//! End-to-end runs over the in-memory network.
//!
//! Tokio's clock is paused, so gossip periods elapse instantly and each run
//! only takes as long as the event processing itself.

use std::{net::SocketAddr, time::Duration};

use gossip_sim::{
    config::{SeedTarget, SimulationConfig},
    report::{JsonReport, Summary},
    transport::{self, InMemoryNetwork},
    NodeState, Simulator,
};
use testresult::TestResult;
use tokio::time::Instant;

const PERIOD: Duration = Duration::from_millis(50);

fn simulator(config: SimulationConfig) -> (Simulator<InMemoryNetwork>, InMemoryNetwork) {
    let network = InMemoryNetwork::new();
    let simulator = Simulator::with_network(config, network.clone()).expect("valid config");
    (simulator, network)
}

#[test_log::test(tokio::test(start_paused = true))]
async fn five_nodes_reach_full_coverage() -> TestResult {
    let config = SimulationConfig::new(5, 2)
        .with_fanout(1)
        .with_period(PERIOD)
        .with_rng_seed(0x5eed);
    let (simulator, _) = simulator(config);
    let simulation = simulator.start().await?;

    let seeded_at = Instant::now();
    assert!(seeded_at >= simulation.started_at());
    simulation.seed(SeedTarget::Origin, "Hello, world!")?;
    simulation.run_to_completion().await?;

    for node in simulation.nodes() {
        let stats = node.stats();
        assert!(stats.num_received >= 1, "node {}", node.vertex());
        assert_eq!(node.state(), NodeState::Propagating);
        assert!(stats.first_received_at.expect("received") >= seeded_at);
    }
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn run_waits_for_external_injection() -> TestResult {
    let config = SimulationConfig::new(10, 3)
        .with_fanout(2)
        .with_period(PERIOD)
        .with_rng_seed(17);
    let (simulator, network) = simulator(config);
    let simulation = simulator.start().await?;

    // let a few idle rounds pass first
    tokio::time::sleep(PERIOD * 3).await;
    assert!(!simulation.all_received());
    assert_eq!(network.delivered(), 0);

    let origin = simulation.origin().expect("origin");
    let target = simulation.ports().addr(origin);
    let injector: SocketAddr = "[::1]:9".parse()?;
    transport::inject(&network, injector, &[target], b"rumor").await?;

    simulation.run_to_completion().await?;
    let origin_node = simulation.node(origin).expect("origin node");
    assert!(origin_node.stats().num_sent >= 3);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn single_node_run() -> TestResult {
    let config = SimulationConfig::new(1, 1).with_period(PERIOD);
    let (simulator, network) = simulator(config);
    let simulation = simulator.start().await?;

    assert!(simulation.repair().is_single_component());
    assert!(simulation.repair().added_edges.is_empty());
    assert_eq!(simulation.graph().edge_count(), 0);

    simulation.seed(SeedTarget::Vertex(1), "rumor")?;
    simulation.run_to_completion().await?;

    let node = simulation.node(1).expect("node");
    assert!(node.neighbors().is_empty());
    let mut stats = node.subscribe();
    stats.wait_for(|s| s.num_sent >= 3).await?;
    assert_eq!(node.stats().num_received, 1);
    assert_eq!(network.delivered(), 0);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn reports_reflect_the_run() -> TestResult {
    let config = SimulationConfig::new(16, 2)
        .with_fanout(2)
        .with_period(PERIOD)
        .with_rng_seed(99);
    let (simulator, _) = simulator(config);
    let simulation = simulator.run(SeedTarget::Origin, "rumor").await?;

    let snapshots = simulation.snapshot();
    let summary = Summary::new(&snapshots);
    assert_eq!(summary.nodes.len(), 16);
    assert!(summary.nodes.iter().all(|n| n.latency.is_some()));
    assert!(summary.max_latency >= summary.avg_latency);
    assert!(summary.rounds >= 1);

    let report = JsonReport::new(&snapshots, simulation.ports());
    assert_eq!(report.nodes.len(), 16);
    assert_eq!(report.links.len(), simulation.graph().edge_count());
    assert!(report.nodes.iter().any(|n| n.iterations == 0));
    for (node, snapshot) in report.nodes.iter().zip(&snapshots) {
        assert_eq!(node.id, format!("N{}", snapshot.vertex));
    }
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn run_seeds_and_waits_in_one_call() -> TestResult {
    let config = SimulationConfig::new(12, 2)
        .with_fanout(1)
        .with_period(PERIOD)
        .with_rng_seed(7);
    let (simulator, network) = simulator(config);
    assert_eq!(simulator.config().num_nodes, 12);

    let simulation = simulator.run(SeedTarget::Origin, &b"rumor"[..]).await?;
    assert!(simulation.all_received());
    assert!(network.delivered() >= 11);

    let origin = simulation.origin().expect("origin");
    let seeded = simulation.node(origin).expect("seeded node").stats();
    let started = simulation.started_at();
    for node in simulation.nodes() {
        let first = node.stats().first_received_at.expect("received");
        assert!(first >= seeded.first_received_at.expect("seeded"));
        assert!(first >= started);
    }
    Ok(())
}

/// Uses real UDP sockets on fixed loopback ports, which may be taken.
#[test_log::test(tokio::test)]
#[ignore = "binds fixed UDP ports on [::1]"]
async fn udp_run_on_loopback() -> TestResult {
    let config = SimulationConfig::new(6, 2)
        .with_fanout(1)
        .with_period(Duration::from_millis(20))
        .with_first_port(47000);
    let simulation = Simulator::new(config)?.start().await?;
    simulation.seed(SeedTarget::Origin, "rumor")?;
    tokio::time::timeout(Duration::from_secs(30), simulation.run_to_completion()).await??;
    assert!(simulation.all_received());
    Ok(())
}
