//! Bus lifecycle state machine.
//!
//! [`next_state`] is a pure transition function over the state, the time spent
//! in it and whether the bus has run out of path. [`advance_lifecycle`] applies
//! the side effects of each transition to the fleet: passenger status changes,
//! path swaps and clearing the job when a bus becomes available again.
//!
//! ```text
//! Available ──► Cruising ──(path done)──► Available
//!     │
//!     └──► GoingToPickup ──(path done)──► Boarding ──(dwell)──► GoingToDropoff
//!                                                                  │ (path done)
//!          Available ◄──(dwell)── Disembarking ◄───────────────────┘
//! ```

use tracing::debug;

use crate::fleet::{Bus, BusState, PassengerStatus};
use crate::geo::{path_length_km, Coordinate};
use crate::store::FleetState;
use crate::telemetry::CompletedTripRecord;

/// Next state for a bus; returns `state` unchanged when no transition fires.
///
/// Leaving `Available` is driven by dispatch and cruising, never by this function.
pub fn next_state(
    state: BusState,
    time_in_state_ms: u64,
    reached_end: bool,
    boarding_ms: u64,
) -> BusState {
    match state {
        BusState::Available => BusState::Available,
        BusState::Cruising if reached_end => BusState::Available,
        BusState::Cruising => BusState::Cruising,
        BusState::GoingToPickup if reached_end => BusState::Boarding,
        BusState::GoingToPickup => BusState::GoingToPickup,
        BusState::Boarding if time_in_state_ms >= boarding_ms => BusState::GoingToDropoff,
        BusState::Boarding => BusState::Boarding,
        BusState::GoingToDropoff if reached_end => BusState::Disembarking,
        BusState::GoingToDropoff => BusState::GoingToDropoff,
        BusState::Disembarking if time_in_state_ms >= boarding_ms => BusState::Available,
        BusState::Disembarking => BusState::Disembarking,
    }
}

/// States in which the movement integrator advances the bus.
pub fn is_moving(state: BusState) -> bool {
    matches!(
        state,
        BusState::Cruising | BusState::GoingToPickup | BusState::GoingToDropoff
    )
}

/// States that count as idle for metrics and scaling.
pub fn is_idle(state: BusState) -> bool {
    matches!(state, BusState::Available | BusState::Cruising)
}

/// A bus that may take a new job: idle and not bound to anyone. Cruising is interruptible.
pub fn is_dispatchable(bus: &Bus) -> bool {
    is_idle(bus.state) && bus.assignment.is_none() && bus.pending_passenger.is_none()
}

/// Where the bus is currently heading, if it is on a job leg.
pub fn destination_for_state(bus: &Bus) -> Option<Coordinate> {
    let assignment = bus.assignment.as_ref()?;
    match bus.state {
        BusState::GoingToPickup => Some(assignment.pickup_location),
        BusState::GoingToDropoff => Some(assignment.dropoff_location),
        _ => None,
    }
}

/// Run one state machine step over every bus and apply the resulting side effects.
pub fn advance_lifecycle(state: &mut FleetState, now_ms: u64, boarding_ms: u64) {
    let FleetState {
        buses,
        passengers,
        telemetry,
        ..
    } = state;

    for bus in buses.iter_mut() {
        // Reserved but paths still resolving.
        if bus.state == BusState::GoingToPickup && bus.assignment.is_none() {
            continue;
        }

        let time_in_state = now_ms.saturating_sub(bus.state_start_ms);
        let reached_end = bus.path.len() <= 1;
        let next = next_state(bus.state, time_in_state, reached_end, boarding_ms);
        if next == bus.state {
            continue;
        }

        debug!(bus = %bus.id, from = ?bus.state, to = ?next, "bus transition");
        let passenger_id = bus.assignment.as_ref().map(|a| a.passenger_id);
        let passenger = passenger_id.and_then(|id| passengers.iter_mut().find(|p| p.id == id));

        match next {
            BusState::Boarding => {
                if let Some(passenger) = passenger {
                    passenger.status = PassengerStatus::OnBoard;
                    passenger.boarded_at = Some(now_ms);
                }
                bus.set_state(next, now_ms);
            }
            BusState::GoingToDropoff => {
                let Some(assignment) = bus.assignment.as_ref() else {
                    bus.release(now_ms);
                    continue;
                };
                bus.path = assignment.dropoff_path.clone();
                bus.passengers_on_board.clear();
                bus.passengers_on_board.insert(assignment.passenger_id);
                bus.set_state(next, now_ms);
            }
            BusState::Disembarking => {
                let distance_km = bus
                    .assignment
                    .as_ref()
                    .map(|a| path_length_km(&a.dropoff_path))
                    .unwrap_or(0.0);
                if let Some(passenger) = passenger {
                    passenger.status = PassengerStatus::Completed;
                    passenger.dropped_off_at = Some(now_ms);
                    passenger.trip_distance_km = Some(distance_km);
                    telemetry.completed_trips.push(CompletedTripRecord {
                        passenger_id: passenger.id,
                        bus_id: bus.id,
                        is_bot: passenger.is_bot,
                        requested_at: passenger.request_ms,
                        boarded_at: passenger.boarded_at.unwrap_or(now_ms),
                        dropped_off_at: now_ms,
                        distance_km,
                    });
                }
                bus.set_state(next, now_ms);
            }
            BusState::Available => bus.release(now_ms),
            BusState::Cruising | BusState::GoingToPickup => bus.set_state(next, now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DWELL: u64 = 3_000;

    #[test]
    fn legs_end_only_on_path_exhaustion() {
        assert_eq!(
            next_state(BusState::GoingToPickup, 60_000, false, DWELL),
            BusState::GoingToPickup
        );
        assert_eq!(
            next_state(BusState::GoingToPickup, 0, true, DWELL),
            BusState::Boarding
        );
        assert_eq!(
            next_state(BusState::GoingToDropoff, 0, true, DWELL),
            BusState::Disembarking
        );
        assert_eq!(next_state(BusState::Cruising, 0, true, DWELL), BusState::Available);
    }

    #[test]
    fn dwell_states_wait_for_the_boarding_duration() {
        assert_eq!(next_state(BusState::Boarding, 2_999, true, DWELL), BusState::Boarding);
        assert_eq!(
            next_state(BusState::Boarding, 3_000, true, DWELL),
            BusState::GoingToDropoff
        );
        assert_eq!(
            next_state(BusState::Disembarking, 3_000, true, DWELL),
            BusState::Available
        );
    }

    #[test]
    fn available_never_leaves_on_its_own() {
        assert_eq!(
            next_state(BusState::Available, u64::MAX, true, DWELL),
            BusState::Available
        );
    }

    #[test]
    fn moving_and_idle_sets() {
        assert!(is_moving(BusState::Cruising));
        assert!(!is_moving(BusState::Boarding));
        assert!(is_idle(BusState::Cruising));
        assert!(!is_idle(BusState::GoingToPickup));
    }
}
