use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usher::api;
use usher::bus::{Bus, MemoryBus, UdpBus};
use usher::cli;
use usher::settings::RunMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usher=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    let settings = args.into_settings();
    settings.validate()?;

    // Socket server listen address setup
    let listen_address: IpAddr = settings
        .listen_address
        .parse::<IpAddr>()
        .expect("Invalid ip address");
    let socket_address = SocketAddr::from((listen_address, settings.listen_port));

    // Heartbeat bus shared by every hosted semaphore
    let bus: Arc<dyn Bus> = match settings.run_mode {
        RunMode::Memory => {
            info!("Starting in-process heartbeat bus (no remote peers)");
            Arc::new(MemoryBus::new())
        }
        RunMode::Udp => {
            let bind_addr = settings.udp_bind_addr()?;
            let peers: Vec<SocketAddr> = settings.topology.iter().cloned().collect();
            if peers.is_empty() {
                info!("No topology configured, this peer contends alone");
            }
            info!(
                "Starting UDP heartbeat bus on {} with {} peers",
                bind_addr,
                peers.len()
            );
            Arc::new(UdpBus::bind(bind_addr, peers).await?)
        }
    };

    // Build Axum Router
    let state = api::AppState::new(bus, settings);
    let api = api::api(state).await?;

    // Start server
    info!("Starting Usher on {}", socket_address);
    axum::Server::bind(&socket_address)
        .serve(api.into_make_service())
        .await?;

    Ok(())
}
