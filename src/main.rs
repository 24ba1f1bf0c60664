use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use work_fleet::collaborators::Collaborators;
use work_fleet::collaborators::sim::SimulatedTarget;
use work_fleet::config::FleetConfig;
use work_fleet::coordinator::Coordinator;
use work_fleet::coordinator::types::ItemId;
use work_fleet::events::EventBus;
use work_fleet::fleet::Fleet;
use work_fleet::fleet::handlers::control_plane;
use work_fleet::store::{FileStore, MemoryStore, PersistentStore};
use work_fleet::worker::WorkerExit;

#[derive(Debug, Parser)]
#[command(version, about = "Coordinates a fleet of resumable batch workers")]
struct Args {
    /// JSON file with timing overrides; missing fields keep their defaults.
    #[arg(long, env = "WORK_FLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Keep registry, flags and checkpoints in this file instead of memory.
    #[arg(long, env = "WORK_FLEET_STATE")]
    state: Option<PathBuf>,

    /// Records served by the simulated target (ids 1..=records).
    #[arg(long, default_value_t = 20)]
    records: u64,

    /// Sub-items per simulated record.
    #[arg(long, default_value_t = 2)]
    sub_items: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Command {
    /// Run one fleet to completion and print the result.
    Run {
        #[arg(long, default_value_t = 2)]
        workers: usize,
        #[arg(long, default_value_t = 1)]
        start: u64,
        /// Highest id to scan; defaults to the last simulated record.
        #[arg(long)]
        max: Option<u64>,
    },
    /// Serve the HTTP control plane.
    Serve {
        #[arg(long, env = "WORK_FLEET_BIND", default_value = "127.0.0.1:6000")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FleetConfig::from_file(path)?,
        None => FleetConfig::default(),
    };

    let store: Arc<dyn PersistentStore> = match &args.state {
        Some(path) => {
            tracing::info!("Persisting fleet state to {}", path.display());
            Arc::new(FileStore::open(path).await?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let target = Arc::new(SimulatedTarget::uniform(1, args.records, args.sub_items));
    let events = EventBus::new();
    let coordinator = Coordinator::new(store, config, events);
    let fleet = Fleet::new(coordinator, Collaborators::from_target(target));

    match args.command {
        Command::Run {
            workers,
            start,
            max,
        } => {
            let max = max.unwrap_or(args.records);
            fleet.start(workers, ItemId(start), Some(ItemId(max))).await?;

            let exits = fleet.wait_all().await;
            for (worker, exit) in &exits {
                tracing::info!("{} exited: {:?}", worker, exit);
            }

            let snapshot = fleet.snapshot().await?;
            tracing::info!(
                "Completed {} records ({} missing, {} empty)",
                snapshot.completed.len(),
                snapshot.not_found.len(),
                snapshot.empty.len()
            );

            if exits
                .iter()
                .any(|(_, exit)| matches!(exit, WorkerExit::Failed(_)))
            {
                anyhow::bail!("one or more workers failed");
            }
        }
        Command::Serve { bind } => {
            let app = control_plane(fleet);

            tracing::info!("Control plane listening on {}", bind);
            tracing::info!("Press Ctrl+C to shutdown");

            let listener = tokio::net::TcpListener::bind(bind).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
