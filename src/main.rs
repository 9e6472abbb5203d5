//! On-demand dispatch service.
//!
//! Loads the TOML configuration and the fleet seed, picks a routing backend
//! and serves the booking and whitelist API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use odm_dispatch::booking::BookingCoordinator;
use odm_dispatch::config::{Config, RoutingBackend};
use odm_dispatch::evaluator::WhitelistService;
use odm_dispatch::haversine::HaversineRouting;
use odm_dispatch::http::{self, Services};
use odm_dispatch::osrm::OsrmClient;
use odm_dispatch::store::{FleetSeed, MemoryStore};
use odm_dispatch::traits::{FleetRepository, RoutingProvider};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

/// On-demand dispatch service for rural ride pooling
#[derive(Parser, Debug)]
#[command(name = "odm-dispatch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let seed = match &config.store.seed {
        Some(path) => FleetSeed::from_json_file(path)?,
        None => FleetSeed::default(),
    };
    info!(
        config_file = %args.config,
        bind = %config.server.bind,
        backend = ?config.routing.backend,
        zones = seed.zones.len(),
        companies = seed.companies.len(),
        vehicles = seed.vehicles.len(),
        timezone = %config.shift.timezone,
        "config_loaded"
    );

    let fleet: Arc<dyn FleetRepository> =
        Arc::new(MemoryStore::new(seed).context("Invalid fleet seed")?);
    let routing: Arc<dyn RoutingProvider> = match config.routing.backend {
        RoutingBackend::Osrm => Arc::new(
            OsrmClient::new(config.routing.osrm.clone()).context("Failed to build OSRM client")?,
        ),
        RoutingBackend::Haversine => Arc::new(HaversineRouting::new(config.routing.speed_kmh)),
    };

    let services = Arc::new(Services {
        booking: BookingCoordinator::new(routing.clone(), fleet.clone(), config.dispatch.clone()),
        whitelist: WhitelistService::new(routing, fleet, config.dispatch.clone(), config.shift.clone()),
    });

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown_requested");
            let _ = shutdown_tx.send(true);
        }
    });

    http::serve(listener, services, shutdown_rx).await?;
    Ok(())
}
