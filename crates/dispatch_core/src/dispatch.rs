//! Dispatch engine: matching, cruising and the fleet operations exposed to callers.
//!
//! Every pass follows the same shape: plan on a snapshot, take leases, reserve
//! the entities in one [`FleetStore::apply`], resolve paths in a spawned task,
//! then settle in a second `apply`. Settling re-checks that the bus is still
//! reserved for the *same* passenger; a result for a cancelled or reassigned
//! passenger is discarded. Leases are owned by the lookup task and released
//! when it finishes, whatever the outcome.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::autoscale::{decide, ScaleDecision};
use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::demand::{unassigned_waiting_bots, BotGenerator};
use crate::error::DispatchError;
use crate::fleet::{
    default_bus_templates, Assignment, Bus, BusId, BusState, BusTemplate, Passenger, PassengerId,
    PassengerStatus,
};
use crate::geo::Coordinate;
use crate::lease::{Lease, LeaseKey, LeaseMap};
use crate::lifecycle::{advance_lifecycle, is_dispatchable};
use crate::matching::{plan_matches, MatchKind, MatchPlan};
use crate::metrics::SimulationMetrics;
use crate::movement::integrate;
use crate::routing::{PathProvider, TripPaths};
use crate::stops::{default_stops, WeightedStops};
use crate::store::{FleetState, FleetStore};

/// Where buses spawn when the stop table is empty.
pub const DEPOT: Coordinate = Coordinate::new(-28.2628, -52.4087);

/// How a path lookup for a reserved bus ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Committed {
        bus_id: BusId,
        passenger_id: PassengerId,
    },
    Reverted {
        bus_id: BusId,
        passenger_id: PassengerId,
        error: DispatchError,
    },
    /// The reservation no longer existed when the paths arrived.
    Discarded {
        bus_id: BusId,
        passenger_id: PassengerId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CruiseOutcome {
    Started(BusId),
    Discarded(BusId),
}

/// What to do with the passenger when a lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// Clear the reservation so the passenger re-enters matching.
    Requeue,
    /// Drop the passenger; the caller reports the failure.
    Remove,
}

#[derive(Clone)]
pub struct DispatchEngine {
    store: FleetStore,
    paths: Arc<PathProvider>,
    leases: LeaseMap,
    clock: SimulationClock,
    config: Arc<watch::Sender<SimulationConfig>>,
    templates: Arc<[BusTemplate]>,
    stops: Arc<WeightedStops>,
    rng: Arc<Mutex<StdRng>>,
}

impl DispatchEngine {
    pub fn new(config: SimulationConfig, store: FleetStore, paths: Arc<PathProvider>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (config, _) = watch::channel(config);
        Self {
            store,
            paths,
            leases: LeaseMap::new(),
            clock: SimulationClock::new(),
            config: Arc::new(config),
            templates: default_bus_templates().into(),
            stops: Arc::new(WeightedStops::new(default_stops())),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn with_stops(mut self, stops: WeightedStops) -> Self {
        self.stops = Arc::new(stops);
        self
    }

    pub fn with_templates(mut self, templates: Vec<BusTemplate>) -> Self {
        self.templates = templates.into();
        self
    }

    pub fn store(&self) -> &FleetStore {
        &self.store
    }

    pub fn leases(&self) -> &LeaseMap {
        &self.leases
    }

    pub fn paths(&self) -> &PathProvider {
        &self.paths
    }

    pub fn stops(&self) -> &WeightedStops {
        &self.stops
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn config(&self) -> SimulationConfig {
        self.config.borrow().clone()
    }

    pub fn update_config(&self, modify: impl FnOnce(&mut SimulationConfig)) {
        self.config.send_modify(modify);
    }

    pub fn subscribe_config(&self) -> watch::Receiver<SimulationConfig> {
        self.config.subscribe()
    }

    fn with_rng<R>(&self, draw: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        draw(&mut rng)
    }

    // ---- matching -------------------------------------------------------

    /// Reserve every match found on the current snapshot and spawn its path lookup.
    pub fn dispatch_matches(&self) -> Vec<JoinHandle<LookupOutcome>> {
        let now = self.clock.now();
        let snapshot = self.store.snapshot();
        let plans = plan_matches(&snapshot, &self.leases.snapshot());

        let mut lookups = Vec::with_capacity(plans.len());
        for plan in plans {
            let Some(leases) = self.leases.try_acquire_pair(
                LeaseKey::Bus(plan.bus_id),
                LeaseKey::Passenger(plan.passenger_id),
            ) else {
                continue;
            };
            if !self.store.apply(|state| reserve(state, &plan, now)) {
                debug!(bus = %plan.bus_id, passenger = %plan.passenger_id, "match went stale before reserving");
                continue;
            }
            debug!(bus = %plan.bus_id, passenger = %plan.passenger_id, kind = ?plan.kind, "bus reserved");
            lookups.push(self.spawn_lookup(plan, leases, OnFailure::Requeue));
        }
        lookups
    }

    /// One matching pass, waiting for every lookup it started to settle.
    pub async fn run_matching_pass(&self) -> Vec<LookupOutcome> {
        let mut outcomes = Vec::new();
        for lookup in self.dispatch_matches() {
            match lookup.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(error = %err, "lookup task failed"),
            }
        }
        outcomes
    }

    fn spawn_lookup(
        &self,
        plan: MatchPlan,
        leases: (Lease, Lease),
        on_failure: OnFailure,
    ) -> JoinHandle<LookupOutcome> {
        let engine = self.clone();
        let span = info_span!("lookup", bus = %plan.bus_id, passenger = %plan.passenger_id);
        tokio::spawn(
            async move {
                let _leases = leases;
                let result = engine.resolve_assignment(&plan).await;
                let now = engine.clock.now();
                engine
                    .store
                    .apply(|state| settle(state, &plan, result, now, on_failure))
            }
            .instrument(span),
        )
    }

    async fn resolve_assignment(&self, plan: &MatchPlan) -> Result<TripPaths, DispatchError> {
        let paths = Arc::clone(&self.paths);
        let (bus_location, origin, destination) = (plan.bus_location, plan.origin, plan.destination);
        let trip = tokio::spawn(async move {
            paths.resolve_trip(bus_location, origin, destination).await
        })
        .await
        .map_err(|err| DispatchError::LookupAborted(err.to_string()))?;

        if trip.pickup.is_empty() || trip.dropoff.is_empty() {
            return Err(DispatchError::EmptyPath);
        }
        Ok(trip)
    }

    // ---- cruising -------------------------------------------------------

    /// Send long-idle buses towards a random stop.
    pub fn dispatch_cruises(&self) -> Vec<JoinHandle<CruiseOutcome>> {
        let now = self.clock.now();
        let grace_ms = self.config.borrow().lifecycle.cruise_grace_ms;
        let snapshot = self.store.snapshot();
        let candidates = cruise_candidates(&snapshot, &self.leases.snapshot(), now, grace_ms);

        let mut lookups = Vec::with_capacity(candidates.len());
        for (bus_id, location) in candidates {
            let Some(target) = self.with_rng(|rng| self.stops.random_stop(rng).map(|s| s.location))
            else {
                break;
            };
            let Some(lease) = self.leases.try_acquire(LeaseKey::Cruise(bus_id)) else {
                continue;
            };

            let engine = self.clone();
            lookups.push(tokio::spawn(
                async move {
                    let _lease = lease;
                    let path = engine.paths.resolve_leg(location, target).await;
                    let now = engine.clock.now();
                    engine.store.apply(|state| settle_cruise(state, bus_id, path, now))
                }
                .instrument(info_span!("cruise", bus = %bus_id)),
            ));
        }
        lookups
    }

    pub async fn run_cruising_pass(&self) -> Vec<CruiseOutcome> {
        let mut outcomes = Vec::new();
        for lookup in self.dispatch_cruises() {
            match lookup.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(error = %err, "cruise task failed"),
            }
        }
        outcomes
    }

    // ---- simulation step ------------------------------------------------

    /// Lifecycle transitions then movement, as one atomic update.
    pub fn tick(&self) {
        let (travel, boarding_ms) = {
            let config = self.config.borrow();
            (config.travel_per_tick(), config.lifecycle.boarding_ms)
        };
        let now = self.clock.now();
        self.store.apply(|state| {
            advance_lifecycle(state, now, boarding_ms);
            integrate(state, travel);
        });
    }

    pub fn metrics(&self) -> SimulationMetrics {
        let now = self.clock.now();
        self.store
            .read(|state| SimulationMetrics::compute(&state.buses, &state.passengers, now))
    }

    pub fn evaluate_fleet(&self) -> ScaleDecision {
        let fleet = self.config.borrow().fleet;
        let now = self.clock.now();
        self.store.read(|state| {
            let metrics = SimulationMetrics::compute(&state.buses, &state.passengers, now);
            decide(&state.buses, &state.passengers, &metrics, &fleet)
        })
    }

    /// Add one bot if fewer than `target_waiting_bots` are waiting unassigned.
    pub fn replenish_bots(&self) -> Option<PassengerId> {
        let config = self.config();
        let now = self.clock.now();
        let generator = BotGenerator::new(&self.stops);
        self.store.apply(|state| {
            if unassigned_waiting_bots(state) >= config.target_waiting_bots {
                return None;
            }
            let id = state.allocate_passenger_id();
            let bot = self.with_rng(|rng| {
                generator.generate(id, now, rng, config.simulated_hour, config.use_realistic_demand)
            })?;
            state.passengers.push(bot);
            Some(id)
        })
    }

    // ---- caller operations ----------------------------------------------

    /// A new waiting passenger with a fresh id, not yet part of the fleet.
    pub fn new_passenger(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        is_bot: bool,
    ) -> Passenger {
        let now = self.clock.now();
        let id = self.store.apply(FleetState::allocate_passenger_id);
        Passenger::new(id, origin, destination, now, is_bot)
    }

    /// Insert a waiting passenger. Rejects malformed coordinates and duplicate ids.
    pub fn add_passenger(&self, passenger: Passenger) -> bool {
        if !passenger.origin.is_well_formed() || !passenger.destination.is_well_formed() {
            warn!(passenger = %passenger.id, "rejecting passenger with malformed coordinates");
            return false;
        }
        self.store.apply(|state| {
            if state.passenger(passenger.id).is_some() {
                return false;
            }
            let mut passenger = passenger;
            passenger.status = PassengerStatus::Waiting;
            state.passengers.push(passenger);
            state.observe_ids();
            true
        })
    }

    /// Bind a user passenger to a chosen bus.
    ///
    /// A free bus is reserved and its paths resolved before returning. A busy bus
    /// gets the passenger queued as a reservation, picked up by the next matching
    /// pass once the bus frees up. Returns `false` for an unknown bus, malformed
    /// coordinates, a passenger some bus is already serving, or a lookup that
    /// failed (the passenger is then dropped).
    pub async fn request_bus_for_user(&self, passenger: Passenger, bus_id: BusId) -> bool {
        if !passenger.origin.is_well_formed() || !passenger.destination.is_well_formed() {
            return false;
        }
        let passenger_id = passenger.id;
        let leases = self
            .leases
            .try_acquire_pair(LeaseKey::Bus(bus_id), LeaseKey::Passenger(passenger_id));
        let now = self.clock.now();

        let admitted = self.store.apply(|state| {
            let Some(bus) = state.bus(bus_id) else {
                return Err(DispatchError::UnknownBus(bus_id));
            };
            let already_bound = state
                .buses
                .iter()
                .any(|other| other.bound_passenger() == Some(passenger_id))
                || state
                    .passenger(passenger_id)
                    .is_some_and(|existing| existing.status != PassengerStatus::Waiting);
            if already_bound {
                return Err(DispatchError::PassengerAlreadyBound(passenger_id));
            }
            let free = leases.is_some() && is_dispatchable(bus);
            let plan = MatchPlan {
                bus_id,
                passenger_id,
                bus_location: bus.location,
                origin: passenger.origin,
                destination: passenger.destination,
                kind: MatchKind::Reservation,
            };
            let mut passenger = passenger;
            passenger.status = PassengerStatus::Waiting;
            passenger.assigned_bus_id = Some(bus_id);
            state.passengers.retain(|p| p.id != passenger_id);
            state.passengers.push(passenger);
            state.observe_ids();

            if free && reserve(state, &plan, now) {
                Ok(Some(plan))
            } else {
                Ok(None)
            }
        });

        let plan = match admitted {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                info!(bus = %bus_id, passenger = %passenger_id, "bus busy, reservation queued");
                return true;
            }
            Err(error) => {
                warn!(%error, passenger = %passenger_id, "user request declined");
                return false;
            }
        };
        let Some(leases) = leases else {
            return true;
        };

        match self.spawn_lookup(plan, leases, OnFailure::Remove).await {
            Ok(LookupOutcome::Reverted { error, .. }) => {
                warn!(%error, bus = %bus_id, "user dispatch failed");
                false
            }
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "user lookup task failed");
                false
            }
        }
    }

    /// Remove a passenger and free the bus serving them. Unknown ids are ignored.
    pub fn cancel_passenger(&self, passenger_id: PassengerId) {
        let now = self.clock.now();
        self.store.apply(|state| {
            let before = state.passengers.len();
            state.passengers.retain(|p| p.id != passenger_id);
            if state.passengers.len() == before {
                return;
            }
            state.telemetry.passengers_cancelled += 1;

            for bus in state.buses.iter_mut() {
                if bus.bound_passenger() != Some(passenger_id) {
                    continue;
                }
                // A disembarking bus finishes its dwell and frees itself.
                if bus.state != BusState::Disembarking {
                    info!(bus = %bus.id, passenger = %passenger_id, state = ?bus.state, "releasing bus of cancelled passenger");
                    bus.release(now);
                }
            }
        });
    }

    /// Delete completed bot passengers; returns how many were removed.
    pub fn cleanup_completed_bots(&self) -> usize {
        self.store.apply(|state| {
            let before = state.passengers.len();
            state
                .passengers
                .retain(|p| !(p.is_bot && p.status == PassengerStatus::Completed));
            before - state.passengers.len()
        })
    }

    pub fn add_bus(&self) -> BusId {
        let now = self.clock.now();
        self.store.apply(|state| self.spawn_bus(state, now))
    }

    /// Remove the first idle, empty, unassigned bus nobody has a queued
    /// reservation on. `None` if there is none.
    pub fn remove_bus(&self) -> Option<BusId> {
        self.store.apply(|state| {
            let reserved = state.reserved_buses();
            let index = state
                .buses
                .iter()
                .position(|bus| bus.is_removable() && !reserved.contains(&bus.id))?;
            let bus = state.buses.remove(index);
            state.telemetry.buses_removed += 1;
            Some(bus.id)
        })
    }

    /// Grow or shrink the fleet towards `target`; returns the resulting size.
    ///
    /// Shrinking removes removable buses without queued reservations in fleet
    /// order and stops early when there are not enough of them.
    pub fn set_fleet_size(&self, target: usize) -> usize {
        let now = self.clock.now();
        self.store.apply(|state| {
            let current = state.buses.len();
            if target > current {
                for _ in current..target {
                    self.spawn_bus(state, now);
                }
            } else if target < current {
                let mut to_remove = current - target;
                let reserved = state.reserved_buses();
                state.buses.retain(|bus| {
                    if to_remove > 0 && bus.is_removable() && !reserved.contains(&bus.id) {
                        to_remove -= 1;
                        false
                    } else {
                        true
                    }
                });
                let removed = current - state.buses.len();
                state.telemetry.buses_removed += removed as u64;
                if to_remove > 0 {
                    debug!(target, shortfall = to_remove, "not enough idle buses to shrink fully");
                }
            }
            state.buses.len()
        })
    }

    fn spawn_bus(&self, state: &mut FleetState, now: u64) -> BusId {
        let index = state.buses.len();
        let id = state.allocate_bus_id();
        let location = self.stops.cycled(index).map_or(DEPOT, |stop| stop.location);
        let bus = match self.templates.get(index % self.templates.len().max(1)) {
            Some(template) => {
                Bus::new(id, format!("{} {}", template.name_prefix, index + 1), location, now)
                    .with_template(template)
            }
            None => Bus::new(id, format!("Bus {}", index + 1), location, now),
        };
        state.buses.push(bus);
        state.telemetry.buses_added += 1;
        id
    }
}

/// Mark the bus `GoingToPickup` for the planned passenger if both are still free.
fn reserve(state: &mut FleetState, plan: &MatchPlan, now: u64) -> bool {
    let claimed_elsewhere = state
        .buses
        .iter()
        .any(|bus| bus.id != plan.bus_id && bus.bound_passenger() == Some(plan.passenger_id));
    let passenger_free = state.passenger(plan.passenger_id).is_some_and(|p| {
        p.status == PassengerStatus::Waiting
            && p.assigned_bus_id.map_or(true, |bus_id| bus_id == plan.bus_id)
    });
    let bus_free = state.bus(plan.bus_id).is_some_and(is_dispatchable);
    if claimed_elsewhere || !passenger_free || !bus_free {
        return false;
    }

    if let Some(bus) = state.bus_mut(plan.bus_id) {
        bus.set_state(BusState::GoingToPickup, now);
        bus.pending_passenger = Some(plan.passenger_id);
        bus.path.clear();
    }
    if let Some(passenger) = state.passenger_mut(plan.passenger_id) {
        passenger.assigned_bus_id = Some(plan.bus_id);
    }
    true
}

fn settle(
    state: &mut FleetState,
    plan: &MatchPlan,
    result: Result<TripPaths, DispatchError>,
    now: u64,
    on_failure: OnFailure,
) -> LookupOutcome {
    let (bus_id, passenger_id) = (plan.bus_id, plan.passenger_id);
    let FleetState {
        buses,
        passengers,
        telemetry,
        ..
    } = state;

    let passenger_index = passengers.iter().position(|p| {
        p.id == passenger_id
            && p.status == PassengerStatus::Waiting
            && p.assigned_bus_id == Some(bus_id)
    });
    let bus = buses.iter_mut().find(|bus| {
        bus.id == bus_id
            && bus.state == BusState::GoingToPickup
            && bus.pending_passenger == Some(passenger_id)
            && bus.assignment.is_none()
    });
    let (Some(bus), Some(passenger_index)) = (bus, passenger_index) else {
        telemetry.stale_lookups_discarded += 1;
        debug!(bus = %bus_id, passenger = %passenger_id, "reservation gone, discarding lookup result");
        return LookupOutcome::Discarded {
            bus_id,
            passenger_id,
        };
    };

    match result {
        Ok(trip) => {
            bus.path = trip.pickup.clone();
            bus.assignment = Some(Assignment {
                passenger_id,
                pickup_location: plan.origin,
                dropoff_location: plan.destination,
                pickup_path: trip.pickup,
                dropoff_path: trip.dropoff,
            });
            bus.pending_passenger = None;
            debug!(bus = %bus_id, passenger = %passenger_id, waypoints = bus.path.len(), "assignment committed");
            LookupOutcome::Committed {
                bus_id,
                passenger_id,
            }
        }
        Err(error) => {
            warn!(%error, bus = %bus_id, passenger = %passenger_id, "lookup failed, reverting reservation");
            bus.release(now);
            match on_failure {
                OnFailure::Requeue => passengers[passenger_index].assigned_bus_id = None,
                OnFailure::Remove => {
                    passengers.remove(passenger_index);
                }
            }
            LookupOutcome::Reverted {
                bus_id,
                passenger_id,
                error,
            }
        }
    }
}

/// Buses idle past the grace period with nothing pending: available, pathless,
/// unassigned, unleased and not reserved by a waiting passenger.
pub fn cruise_candidates(
    state: &FleetState,
    leased: &std::collections::HashSet<LeaseKey>,
    now: u64,
    grace_ms: u64,
) -> Vec<(BusId, Coordinate)> {
    let reserved = state.reserved_buses();
    state
        .buses
        .iter()
        .filter(|bus| {
            bus.state == BusState::Available
                && bus.assignment.is_none()
                && bus.pending_passenger.is_none()
                && bus.path.is_empty()
                && now.saturating_sub(bus.state_start_ms) > grace_ms
                && !leased.contains(&LeaseKey::Bus(bus.id))
                && !leased.contains(&LeaseKey::Cruise(bus.id))
                && !reserved.contains(&bus.id)
        })
        .map(|bus| (bus.id, bus.location))
        .collect()
}

fn settle_cruise(
    state: &mut FleetState,
    bus_id: BusId,
    path: Vec<Coordinate>,
    now: u64,
) -> CruiseOutcome {
    let Some(bus) = state.bus_mut(bus_id) else {
        return CruiseOutcome::Discarded(bus_id);
    };
    if bus.state != BusState::Available
        || bus.assignment.is_some()
        || bus.pending_passenger.is_some()
        || path.len() <= 1
    {
        debug!(bus = %bus_id, state = ?bus.state, "cruise path no longer applicable");
        return CruiseOutcome::Discarded(bus_id);
    }
    bus.path = path;
    bus.set_state(BusState::Cruising, now);
    CruiseOutcome::Started(bus_id)
}
