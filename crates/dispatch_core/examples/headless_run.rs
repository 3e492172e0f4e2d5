//! Run the dispatch engine without a UI and print fleet metrics once per second.
//!
//! Usage: `cargo run --example headless_run [seconds] [speed]`
//! Set `RUST_LOG=dispatch_core=debug` to follow individual passes.

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::config::SimulationConfig;
use dispatch_core::dispatch::DispatchEngine;
use dispatch_core::metrics::format_wait_time;
use dispatch_core::routing::build_path_provider;
use dispatch_core::runner;
use dispatch_core::store::FleetStore;
use dispatch_core::telemetry::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30);
    let speed: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(20.0);

    let config = SimulationConfig::default()
        .with_seed(42)
        .with_speed_multiplier(speed);
    let paths = Arc::new(build_path_provider(&config.routing));
    let min_buses = config.fleet.min_buses;
    let engine = DispatchEngine::new(config, FleetStore::default(), paths);
    engine.set_fleet_size(min_buses);

    let handle = runner::start(engine);
    for second in 1..=seconds {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let metrics = handle.engine().metrics();
        println!(
            "[{second:>3}s] buses {:>2} (active {:>2}, idle {:>2}) | waiting {:>3} | on board {:>2} | served {:>3} | avg wait {} ({:?}) | utilization {:.0}%",
            metrics.buses_active + metrics.buses_idle,
            metrics.buses_active,
            metrics.buses_idle,
            metrics.passengers_waiting,
            metrics.passengers_on_board,
            metrics.passengers_served_total,
            format_wait_time(metrics.average_wait_secs),
            metrics.wait_status(),
            metrics.fleet_utilization,
        );
    }

    let engine = handle.engine().clone();
    handle.shutdown().await;

    let stats = engine.paths().stats();
    let state = engine.store().snapshot();
    println!(
        "done: {} trips, {} cancelled, {} stale lookups, {} path requests ({} cached, {} fallbacks)",
        state.telemetry.completed_trips.len(),
        state.telemetry.passengers_cancelled,
        state.telemetry.stale_lookups_discarded,
        stats.requests,
        stats.cache_hits,
        stats.fallbacks,
    );
}
