//! Matching passes: pair waiting passengers with dispatchable buses.
//!
//! Planning is pure over a fleet snapshot and the set of held leases. Two passes
//! run in order, each bus and each passenger used at most once:
//!
//! 1. **Reservation**: a passenger who picked a specific bus (`assigned_bus_id`)
//!    gets that bus as soon as it is free.
//! 2. **Nearest**: remaining unreserved bot passengers, in request order, take the
//!    nearest unused bus by planar distance.

use std::collections::HashSet;

use crate::fleet::{Bus, BusId, Passenger, PassengerId, PassengerStatus};
use crate::geo::Coordinate;
use crate::lease::LeaseKey;
use crate::lifecycle::is_dispatchable;
use crate::store::FleetState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Reservation,
    Nearest,
}

/// A planned pairing, carrying the coordinates needed for the path lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPlan {
    pub bus_id: BusId,
    pub passenger_id: PassengerId,
    pub bus_location: Coordinate,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub kind: MatchKind,
}

impl MatchPlan {
    fn new(bus: &Bus, passenger: &Passenger, kind: MatchKind) -> Self {
        Self {
            bus_id: bus.id,
            passenger_id: passenger.id,
            bus_location: bus.location,
            origin: passenger.origin,
            destination: passenger.destination,
            kind,
        }
    }
}

/// Dispatchable buses without a bus lease, in fleet order.
pub fn candidate_buses<'a>(state: &'a FleetState, leased: &HashSet<LeaseKey>) -> Vec<&'a Bus> {
    state
        .buses
        .iter()
        .filter(|bus| is_dispatchable(bus) && !leased.contains(&LeaseKey::Bus(bus.id)))
        .collect()
}

/// First bus with the smallest planar distance to `origin`.
pub fn find_nearest(origin: Coordinate, available: &[(BusId, Coordinate)]) -> Option<BusId> {
    let mut best: Option<(BusId, f64)> = None;
    for (bus_id, location) in available {
        let distance = location.planar_distance(&origin);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((*bus_id, distance)),
        }
    }
    best.map(|(bus_id, _)| bus_id)
}

pub fn plan_matches(state: &FleetState, leased: &HashSet<LeaseKey>) -> Vec<MatchPlan> {
    let candidates = candidate_buses(state, leased);
    if candidates.is_empty() {
        return Vec::new();
    }

    let claimed: HashSet<PassengerId> = state
        .buses
        .iter()
        .filter_map(Bus::bound_passenger)
        .collect();
    let is_free = |p: &Passenger| {
        p.status == PassengerStatus::Waiting
            && !leased.contains(&LeaseKey::Passenger(p.id))
            && !claimed.contains(&p.id)
    };

    let mut plans = Vec::new();
    let mut used_buses: HashSet<BusId> = HashSet::new();
    let mut used_passengers: HashSet<PassengerId> = HashSet::new();

    for bus in &candidates {
        let reserved = state.passengers.iter().find(|p| {
            p.assigned_bus_id == Some(bus.id) && is_free(p) && !used_passengers.contains(&p.id)
        });
        if let Some(passenger) = reserved {
            used_buses.insert(bus.id);
            used_passengers.insert(passenger.id);
            plans.push(MatchPlan::new(bus, passenger, MatchKind::Reservation));
        }
    }

    let waiting_bots = state.passengers.iter().filter(|p| {
        p.is_bot && p.assigned_bus_id.is_none() && is_free(p) && !used_passengers.contains(&p.id)
    });
    for passenger in waiting_bots {
        let available: Vec<(BusId, Coordinate)> = candidates
            .iter()
            .filter(|bus| !used_buses.contains(&bus.id))
            .map(|bus| (bus.id, bus.location))
            .collect();
        let Some(bus_id) = find_nearest(passenger.origin, &available) else {
            break;
        };
        let Some(bus) = candidates.iter().find(|bus| bus.id == bus_id) else {
            break;
        };
        used_buses.insert(bus_id);
        plans.push(MatchPlan::new(bus, passenger, MatchKind::Nearest));
    }

    plans
}
