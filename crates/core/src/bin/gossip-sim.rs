use std::net::{Ipv6Addr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use gossip_sim::{
    config::{ConfigArgs, DEFAULT_MESSAGE},
    report::{JsonReport, Summary},
    transport::{self, UdpNetwork},
    Simulator,
};
use tracing::level_filters::LevelFilter;

#[derive(clap::Parser, Debug)]
#[command(name = "gossip-sim", version, about = "Gossip dissemination simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Build a topology, start one node per vertex and wait until all got the rumor.
    Run(ConfigArgs),
    /// Send a rumor to running nodes.
    Inject(InjectArgs),
}

#[derive(clap::Args, Debug)]
struct InjectArgs {
    /// Port number of a gossip node on [::1].
    #[arg(long, required = true, num_args = 1..)]
    port: Vec<u16>,

    #[arg(long, default_value = DEFAULT_MESSAGE)]
    message: String,
}

async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let simulator = Simulator::new(args.build()?)?;

    let simulation = match args.seed {
        Some(target) => {
            tokio::select! {
                done = simulator.run(target, args.message.clone()) => done?,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("interrupted before the rumor reached every node");
                }
            }
        }
        None => {
            let simulation = simulator.start().await?;
            let origin = simulation.origin().map(|v| simulation.ports().port(v));
            tracing::info!(
                origin_port = ?origin,
                "Waiting for a rumor, e.g. `gossip-sim inject --port <origin_port>`"
            );
            tokio::select! {
                done = simulation.run_to_completion() => done?,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("interrupted before the rumor reached every node");
                }
            }
            simulation
        }
    };

    let snapshots = simulation.snapshot();
    println!("{}", Summary::new(&snapshots));

    if let Some(path) = &simulator.config().output_path {
        JsonReport::new(&snapshots, simulation.ports())
            .write_to_path(path)
            .with_context(|| format!("failed writing results to {}", path.display()))?;
        println!("Wrote results to {}", path.display());
    }
    Ok(())
}

async fn inject(args: InjectArgs) -> anyhow::Result<()> {
    let from = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0);
    let targets: Vec<SocketAddr> = args
        .port
        .iter()
        .map(|&port| SocketAddr::new(Ipv6Addr::LOCALHOST.into(), port))
        .collect();
    let written = transport::inject(&UdpNetwork, from, &targets, args.message.as_bytes()).await?;
    for (target, num) in targets.iter().zip(written) {
        println!("Wrote {num} bytes to :{}", target.port());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    gossip_sim::config::set_logger(Some(cli.log_level));

    // one thread: every node shares a single cooperative event loop
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run(args).await,
            Command::Inject(args) => inject(args).await,
        }
    })
}
