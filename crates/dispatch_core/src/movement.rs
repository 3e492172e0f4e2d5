//! Movement integrator: advances buses along their paths by a fixed distance per tick.
//!
//! Interpolation is planar in degree space, matching the distance metric used by matching.

use crate::fleet::Bus;
use crate::lifecycle::is_moving;
use crate::store::FleetState;

/// Move one bus toward its next waypoint. Returns `true` if a waypoint was consumed.
pub fn step_bus(bus: &mut Bus, travel: f64) -> bool {
    if !is_moving(bus.state) || bus.path.len() < 2 {
        return false;
    }

    let next = bus.path[1];
    let d_lat = next.lat - bus.location.lat;
    let d_lng = next.lng - bus.location.lng;
    let distance = d_lat.hypot(d_lng);

    if travel >= distance {
        bus.location = next;
        bus.path.remove(0);
        return true;
    }

    let ratio = travel / distance;
    bus.location.lat += d_lat * ratio;
    bus.location.lng += d_lng * ratio;
    false
}

/// Advance every moving bus by `travel` degrees.
pub fn integrate(state: &mut FleetState, travel: f64) {
    for bus in state.buses.iter_mut() {
        step_bus(bus, travel);
    }
}
