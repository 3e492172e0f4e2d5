//! Periodic task scheduler.
//!
//! One tokio task per concern, each on its own interval: matching, cruising,
//! the lifecycle/movement tick, bot cleanup, fleet evaluation and bot demand.
//! Tasks share nothing but the [`DispatchEngine`] and never coordinate with each
//! other; leases and atomic store updates keep them consistent. Periods are read
//! once at start; pause, speed and scaling flags are read on every tick.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, Instrument};

use crate::autoscale::ScaleThrottle;
use crate::config::SimulationConfig;
use crate::dispatch::DispatchEngine;

pub struct RunnerHandle {
    engine: DispatchEngine,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    pub fn update_config(&self, modify: impl FnOnce(&mut SimulationConfig)) {
        self.engine.update_config(modify);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every periodic task and wait for them to exit.
    ///
    /// Path lookups already spawned by a pass keep running to completion; their
    /// results still settle through the store.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("runner stopped");
    }
}

/// Spawn all periodic tasks for `engine`.
pub fn start(engine: DispatchEngine) -> RunnerHandle {
    let config = engine.config();
    let intervals = config.intervals;
    let (shutdown, stop) = watch::channel(false);

    let mut tasks = Vec::new();
    tasks.push(spawn_periodic("matching", intervals.matching_ms, &engine, &stop, |engine| {
        engine.dispatch_matches();
    }));
    tasks.push(spawn_periodic("cruising", intervals.cruising_ms, &engine, &stop, |engine| {
        engine.dispatch_cruises();
    }));
    tasks.push(spawn_periodic("tick", intervals.tick_ms, &engine, &stop, DispatchEngine::tick));
    tasks.push(spawn_periodic("cleanup", intervals.cleanup_ms, &engine, &stop, |engine| {
        let removed = engine.cleanup_completed_bots();
        if removed > 0 {
            debug!(removed, "completed bots swept");
        }
    }));

    let mut throttle = ScaleThrottle::new(config.fleet.min_apply_interval_ms);
    tasks.push(spawn_periodic(
        "fleet",
        config.fleet.evaluation_interval_ms,
        &engine,
        &stop,
        move |engine| {
            if !engine.config().fleet_auto_scale {
                return;
            }
            let decision = engine.evaluate_fleet();
            if throttle.permit(&decision, engine.now()) {
                let size = engine.set_fleet_size(decision.recommended_bus_count);
                info!(
                    decision = %decision,
                    demand = decision.demand_score,
                    efficiency = decision.efficiency_score,
                    size,
                    "fleet resized"
                );
            }
        },
    ));

    tasks.push(spawn_periodic("demand", intervals.demand_ms, &engine, &stop, |engine| {
        engine.replenish_bots();
    }));

    info!(tasks = tasks.len(), "runner started");
    RunnerHandle {
        engine,
        shutdown,
        tasks,
    }
}

fn spawn_periodic<F>(
    name: &'static str,
    period_ms: u64,
    engine: &DispatchEngine,
    stop: &watch::Receiver<bool>,
    mut step: F,
) -> JoinHandle<()>
where
    F: FnMut(&DispatchEngine) + Send + 'static,
{
    let engine = engine.clone();
    let mut stop = stop.clone();
    let config = engine.subscribe_config();

    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = interval.tick() => {
                        if config.borrow().is_paused {
                            continue;
                        }
                        step(&engine);
                    }
                }
            }
            debug!("task stopped");
        }
        .instrument(info_span!("periodic", task = name)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::PathProvider;
    use crate::store::FleetStore;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn paused_runner_leaves_the_fleet_alone() {
        let engine = DispatchEngine::new(
            SimulationConfig::default().with_seed(1),
            FleetStore::default(),
            Arc::new(PathProvider::straight_line()),
        );
        engine.update_config(|config| config.is_paused = true);
        let handle = start(engine);
        assert_eq!(handle.task_count(), 6);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let (buses, passengers) = handle
            .engine()
            .store()
            .read(|state| (state.buses.len(), state.passengers.len()));
        assert_eq!((buses, passengers), (0, 0));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn demand_and_scaling_fill_an_empty_system() {
        let engine = DispatchEngine::new(
            SimulationConfig::default().with_seed(2),
            FleetStore::default(),
            Arc::new(PathProvider::straight_line()),
        );
        let handle = start(engine);

        tokio::time::sleep(Duration::from_secs(12)).await;
        let state = handle.engine().store().snapshot();
        assert!(state.buses.len() >= 3, "fleet grew to its minimum");
        assert!(!state.passengers.is_empty(), "bots were generated");
        assert!(state.invariant_violations().is_empty());
        handle.shutdown().await;
    }
}
