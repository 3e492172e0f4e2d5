//! Telemetry: structured logging setup and completed-trip records.

use crate::fleet::{BusId, PassengerId};

/// One finished ride, recorded when the bus starts disembarking.
/// Timestamps are simulation milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTripRecord {
    pub passenger_id: PassengerId,
    pub bus_id: BusId,
    pub is_bot: bool,
    pub requested_at: u64,
    pub boarded_at: u64,
    pub dropped_off_at: u64,
    pub distance_km: f64,
}

impl CompletedTripRecord {
    /// Time from request to boarding.
    pub fn wait_ms(&self) -> u64 {
        self.boarded_at.saturating_sub(self.requested_at)
    }

    /// Time spent on board.
    pub fn ride_ms(&self) -> u64 {
        self.dropped_off_at.saturating_sub(self.boarded_at)
    }
}

/// Counters and records kept alongside the fleet state.
#[derive(Debug, Clone, Default)]
pub struct FleetTelemetry {
    pub completed_trips: Vec<CompletedTripRecord>,
    pub passengers_cancelled: u64,
    /// Lookup results dropped because the fleet moved on while they were in flight.
    pub stale_lookups_discarded: u64,
    pub buses_added: u64,
    pub buses_removed: u64,
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_derives_wait_and_ride_times() {
        let record = CompletedTripRecord {
            passenger_id: PassengerId(1),
            bus_id: BusId(1),
            is_bot: true,
            requested_at: 1_000,
            boarded_at: 31_000,
            dropped_off_at: 91_000,
            distance_km: 1.2,
        };
        assert_eq!(record.wait_ms(), 30_000);
        assert_eq!(record.ride_ms(), 60_000);
    }
}
