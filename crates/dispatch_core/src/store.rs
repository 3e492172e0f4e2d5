//! Shared fleet state with snapshot-then-apply access.
//!
//! Every periodic task reads an owned [`FleetState`] snapshot, computes what it
//! wants to change, then hands a closure to [`FleetStore::apply`]. The closure
//! runs under one lock acquisition, so no task ever observes a half-applied
//! update. The lock is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::fleet::{Bus, BusId, BusState, Passenger, PassengerId, PassengerStatus};
use crate::telemetry::FleetTelemetry;

#[derive(Debug, Clone, Default)]
pub struct FleetState {
    pub buses: Vec<Bus>,
    /// Iteration order is request order; greedy matching depends on it.
    pub passengers: Vec<Passenger>,
    pub telemetry: FleetTelemetry,
    pub(crate) next_bus_id: u64,
    pub(crate) next_passenger_id: u64,
}

impl FleetState {
    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.iter().find(|bus| bus.id == id)
    }

    pub fn bus_mut(&mut self, id: BusId) -> Option<&mut Bus> {
        self.buses.iter_mut().find(|bus| bus.id == id)
    }

    pub fn passenger(&self, id: PassengerId) -> Option<&Passenger> {
        self.passengers.iter().find(|p| p.id == id)
    }

    pub fn passenger_mut(&mut self, id: PassengerId) -> Option<&mut Passenger> {
        self.passengers.iter_mut().find(|p| p.id == id)
    }

    pub fn allocate_bus_id(&mut self) -> BusId {
        self.next_bus_id += 1;
        BusId(self.next_bus_id)
    }

    pub fn allocate_passenger_id(&mut self) -> PassengerId {
        self.next_passenger_id += 1;
        PassengerId(self.next_passenger_id)
    }

    /// Keep the id counters ahead of externally supplied ids.
    pub(crate) fn observe_ids(&mut self) {
        if let Some(max) = self.buses.iter().map(|bus| bus.id.0).max() {
            self.next_bus_id = self.next_bus_id.max(max);
        }
        if let Some(max) = self.passengers.iter().map(|p| p.id.0).max() {
            self.next_passenger_id = self.next_passenger_id.max(max);
        }
    }

    /// Descriptions of every broken fleet invariant; empty when the state is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut claimed: HashMap<PassengerId, BusId> = HashMap::new();

        for bus in &self.buses {
            if let Some(assignment) = &bus.assignment {
                // A disembarking bus still holds the job of a passenger who just completed.
                let expected = usize::from(bus.state != BusState::Disembarking);
                // Waiting passengers queued on a busy bus are reservations, not riders.
                let bound = self
                    .passengers
                    .iter()
                    .filter(|p| p.assigned_bus_id == Some(bus.id) && p.is_active())
                    .filter(|p| {
                        p.id == assignment.passenger_id || p.status != PassengerStatus::Waiting
                    })
                    .count();
                if bound != expected {
                    violations.push(format!(
                        "{} holds an assignment but {} active passengers point at it",
                        bus.id, bound
                    ));
                }
                if let Some(other) = claimed.insert(assignment.passenger_id, bus.id) {
                    violations.push(format!(
                        "{} is assigned to both {} and {}",
                        assignment.passenger_id, other, bus.id
                    ));
                }
            }

            let carrying_allowed =
                matches!(bus.state, BusState::GoingToDropoff | BusState::Disembarking);
            if !bus.passengers_on_board.is_empty() && !carrying_allowed {
                violations.push(format!(
                    "{} carries passengers while {:?}",
                    bus.id, bus.state
                ));
            }
        }

        violations
    }

    /// Buses some waiting passenger has reserved.
    pub fn reserved_buses(&self) -> HashSet<BusId> {
        self.passengers
            .iter()
            .filter(|p| p.status == PassengerStatus::Waiting)
            .filter_map(|p| p.assigned_bus_id)
            .collect()
    }

    pub fn waiting_count(&self) -> usize {
        self.passengers
            .iter()
            .filter(|p| p.status == PassengerStatus::Waiting)
            .count()
    }
}

/// Cloneable handle to the shared [`FleetState`].
#[derive(Debug, Clone, Default)]
pub struct FleetStore {
    inner: Arc<Mutex<FleetState>>,
}

impl FleetStore {
    pub fn new(buses: Vec<Bus>, passengers: Vec<Passenger>) -> Self {
        let mut state = FleetState {
            buses,
            passengers,
            ..FleetState::default()
        };
        state.observe_ids();
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owned, consistent copy of the current state.
    pub fn snapshot(&self) -> FleetState {
        self.lock().clone()
    }

    /// Run `transition` as one atomic state change and return its result.
    pub fn apply<R>(&self, transition: impl FnOnce(&mut FleetState) -> R) -> R {
        let mut state = self.lock();
        transition(&mut state)
    }

    /// Read-only access without cloning the whole fleet.
    pub fn read<R>(&self, view: impl FnOnce(&FleetState) -> R) -> R {
        let state = self.lock();
        view(&state)
    }
}
