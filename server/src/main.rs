use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::events::SimulationConfig;
use server::network::{Server, ServerConfig};
use server::roster::SimulatedRosterSource;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Seconds between online-roster polls
    #[arg(long, default_value = "5")]
    roster_interval: u64,

    /// Seconds between demo-simulation ticks
    #[arg(long, default_value = "5")]
    simulation_interval: u64,

    /// Per-tick probability of a simulated kill
    #[arg(long, default_value = "0.4")]
    kill_chance: f64,

    /// Per-tick probability of a simulated environmental death
    #[arg(long, default_value = "0.15")]
    death_chance: f64,

    /// Disable the demo simulation (events then only come from requests)
    #[arg(long)]
    no_simulation: bool,

    /// Maximum number of concurrently subscribed viewers
    #[arg(long, default_value = "64")]
    max_subscribers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let simulation = if args.no_simulation {
        None
    } else {
        Some(SimulationConfig {
            kill_chance: args.kill_chance,
            death_chance: args.death_chance,
        })
    };

    let config = ServerConfig {
        roster_interval: Duration::from_secs(args.roster_interval),
        simulation,
        simulation_interval: Duration::from_secs(args.simulation_interval),
        max_subscribers: args.max_subscribers,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;
    server.spawn_roster_poller(SimulatedRosterSource::new(StdRng::from_entropy()));

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
