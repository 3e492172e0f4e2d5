//! Test helpers: fixture coordinates, a scriptable route resolver and engine setup.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::config::{RoutingConfig, SimulationConfig};
use crate::dispatch::DispatchEngine;
use crate::error::RouteError;
use crate::fleet::{Bus, Passenger};
use crate::geo::Coordinate;
use crate::routing::{PathProvider, RouteResolver};
use crate::store::FleetStore;

/// Shopping Bella Città.
pub const STOP_A: Coordinate = Coordinate::new(-28.2635, -52.4075);
/// UPF campus.
pub const STOP_B: Coordinate = Coordinate::new(-28.2325, -52.3815);
/// Rodoviária.
pub const STOP_C: Coordinate = Coordinate::new(-28.2700, -52.4200);

/// Route resolver whose answers and timing are driven by the test.
///
/// Each call pops the next queued outcome, or echoes the input points when the
/// queue is empty. In blocking mode a call waits for [`ScriptedResolver::release`]
/// before answering, which keeps lookups in flight for as long as a test needs.
#[derive(Debug)]
pub struct ScriptedResolver {
    outcomes: Mutex<VecDeque<Result<Vec<Coordinate>, RouteError>>>,
    latch: Option<Semaphore>,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ScriptedResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            latch: None,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Calls block until released.
    pub fn blocking() -> Self {
        Self {
            latch: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn with_outcomes(
        self,
        outcomes: impl IntoIterator<Item = Result<Vec<Coordinate>, RouteError>>,
    ) -> Self {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
        self
    }

    /// Let `n` blocked calls (current or future) proceed.
    pub fn release(&self, n: usize) {
        if let Some(latch) = &self.latch {
            latch.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteResolver for ScriptedResolver {
    async fn resolve(&self, points: &[Coordinate]) -> Result<Vec<Coordinate>, RouteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        if let Some(latch) = &self.latch {
            if let Ok(permit) = latch.acquire().await {
                permit.forget();
            }
        }

        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(points.to_vec()))
    }
}

/// Provider over `resolver` with default routing limits.
pub fn provider_with(resolver: Arc<ScriptedResolver>) -> Arc<PathProvider> {
    Arc::new(PathProvider::new(resolver, &RoutingConfig::default()))
}

/// Engine with a fixed seed over the given fleet and provider.
pub fn create_test_engine(
    buses: Vec<Bus>,
    passengers: Vec<Passenger>,
    paths: Arc<PathProvider>,
) -> DispatchEngine {
    DispatchEngine::new(
        SimulationConfig::default().with_seed(7),
        FleetStore::new(buses, passengers),
        paths,
    )
}
