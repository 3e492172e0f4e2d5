//! Fleet data model: buses, passengers and the single-passenger assignment that binds them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PassengerId(pub u64);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus-{}", self.0)
    }
}

impl fmt::Display for PassengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "passenger-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusState {
    Available,
    Cruising,
    GoingToPickup,
    Boarding,
    GoingToDropoff,
    Disembarking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassengerStatus {
    Waiting,
    OnBoard,
    Completed,
}

/// The one job a bus is currently serving, with both legs pre-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub passenger_id: PassengerId,
    pub pickup_location: Coordinate,
    pub dropoff_location: Coordinate,
    pub pickup_path: Vec<Coordinate>,
    pub dropoff_path: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub color: String,
    /// Stored for display; ridership is never checked against it.
    pub capacity: u32,
    pub location: Coordinate,
    /// Remaining waypoints; the first one is where the bus currently is.
    pub path: Vec<Coordinate>,
    pub state: BusState,
    pub state_start_ms: u64,
    pub assignment: Option<Assignment>,
    /// Passenger this bus was reserved for while its paths are still being resolved.
    pub pending_passenger: Option<PassengerId>,
    pub passengers_on_board: BTreeSet<PassengerId>,
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>, location: Coordinate, now_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            color: String::from("#2563eb"),
            capacity: 40,
            location,
            path: Vec::new(),
            state: BusState::Available,
            state_start_ms: now_ms,
            assignment: None,
            pending_passenger: None,
            passengers_on_board: BTreeSet::new(),
        }
    }

    pub fn with_template(mut self, template: &BusTemplate) -> Self {
        self.color = template.color.clone();
        self.capacity = template.capacity;
        self
    }

    /// Enter `state`, stamping the transition time.
    pub fn set_state(&mut self, state: BusState, now_ms: u64) {
        self.state = state;
        self.state_start_ms = now_ms;
    }

    /// Return to `Available` where the bus stands, dropping any job and route.
    pub fn release(&mut self, now_ms: u64) {
        self.set_state(BusState::Available, now_ms);
        self.assignment = None;
        self.pending_passenger = None;
        self.passengers_on_board.clear();
        self.path.clear();
    }

    /// The passenger this bus is bound to, committed or still pending.
    pub fn bound_passenger(&self) -> Option<PassengerId> {
        self.assignment
            .as_ref()
            .map(|assignment| assignment.passenger_id)
            .or(self.pending_passenger)
    }

    /// Idle, unassigned and empty: the only buses the fleet may retire.
    pub fn is_removable(&self) -> bool {
        matches!(self.state, BusState::Available | BusState::Cruising)
            && self.assignment.is_none()
            && self.pending_passenger.is_none()
            && self.passengers_on_board.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    pub id: PassengerId,
    pub name: String,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub status: PassengerStatus,
    pub assigned_bus_id: Option<BusId>,
    pub request_ms: u64,
    pub is_bot: bool,
    pub boarded_at: Option<u64>,
    pub dropped_off_at: Option<u64>,
    pub trip_distance_km: Option<f64>,
}

impl Passenger {
    pub fn new(
        id: PassengerId,
        origin: Coordinate,
        destination: Coordinate,
        request_ms: u64,
        is_bot: bool,
    ) -> Self {
        Self {
            id,
            name: String::new(),
            origin,
            destination,
            status: PassengerStatus::Waiting,
            assigned_bus_id: None,
            request_ms,
            is_bot,
            boarded_at: None,
            dropped_off_at: None,
            trip_distance_km: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != PassengerStatus::Completed
    }
}

/// Cosmetic attributes for buses created at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusTemplate {
    pub name_prefix: String,
    pub color: String,
    pub capacity: u32,
}

pub fn default_bus_templates() -> Vec<BusTemplate> {
    [
        ("Expresso", "#2563eb", 40),
        ("Linha", "#dc2626", 45),
        ("Integração", "#059669", 35),
        ("Circular", "#d97706", 30),
        ("Rápido", "#7c3aed", 40),
    ]
    .into_iter()
    .map(|(prefix, color, capacity)| BusTemplate {
        name_prefix: prefix.to_string(),
        color: color.to_string(),
        capacity,
    })
    .collect()
}
