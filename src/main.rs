//! VoyageGate gateway entry point: loads configuration, wires up the
//! persistence and upstream layers, spawns the background sweepers, and
//! serves the HTTP surface.

use std::sync::Arc;

use voyagegate::api::{AppState, ApiServerBuilder};
use voyagegate::booking::BookingMachine;
use voyagegate::config::Config;
use voyagegate::database::cache_store::CacheStore;
use voyagegate::database::catalogue::CatalogueStore;
use voyagegate::database::orders::OrderStore;
use voyagegate::governor::Governor;
use voyagegate::resolver::Resolver;
use voyagegate::search::SearchOrchestrator;
use voyagegate::upstream::{UpstreamClient, UpstreamConfig};
use voyagegate::{database, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);
    telemetry::init();

    tracing::info!(version = voyagegate::VERSION, "starting voyagegate");

    let pool = database::setup(&config.database_url).await?;

    let governor = Arc::new(Governor::new());
    let upstream = UpstreamClient::new(UpstreamConfig::from(config.as_ref()), governor.clone());

    let resolver = Resolver::new(CacheStore::new(pool.clone()), CatalogueStore::new(pool.clone()), upstream.clone());
    let search = SearchOrchestrator::new(
        CacheStore::new(pool.clone()),
        CatalogueStore::new(pool.clone()),
        resolver,
        upstream.clone(),
    );
    let booking = BookingMachine::new(OrderStore::new(pool.clone()), upstream.clone());

    let app_state = Arc::new(AppState {
        config: config.clone(),
        search,
        booking,
        cache: CacheStore::new(pool.clone()),
        catalogue: CatalogueStore::new(pool.clone()),
        upstream: upstream.clone(),
        governor: governor.clone(),
    });

    spawn_governor_sweeper(governor, config.governor_sweep_interval);
    spawn_cache_sweeper(CacheStore::new(pool.clone()), config.cache_sweep_interval);

    ApiServerBuilder::new()
        .with_state(app_state)
        .port(config.port)
        .serve()
        .await?;

    Ok(())
}

/// Background hygiene: prunes endpoints whose admission window has
/// gone idle. Correctness never depends on this running.
fn spawn_governor_sweeper(governor: Arc<Governor>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            governor.sweep();
        }
    });
}

/// Background hygiene: deletes expired cache rows. Correctness never
/// depends on this running since reads also check expiry inline.
fn spawn_cache_sweeper(cache: CacheStore, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match cache.sweep().await {
                Ok(n) if n > 0 => tracing::info!(rows_deleted = n, "cache sweep completed"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "cache sweep failed"),
            }
        }
    });
}
