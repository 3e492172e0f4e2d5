//! Demand and utilization statistics over the current fleet.

use serde::Serialize;

use crate::fleet::{Bus, Passenger, PassengerStatus};
use crate::lifecycle::is_idle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimulationMetrics {
    /// Mean of `now - request_ms` over waiting passengers, in seconds; 0 when nobody waits.
    pub average_wait_secs: f64,
    pub passengers_waiting: usize,
    pub passengers_on_board: usize,
    pub passengers_served_total: usize,
    /// Percentage of buses not idle; 0 for an empty fleet.
    pub fleet_utilization: f64,
    pub buses_active: usize,
    pub buses_idle: usize,
}

impl SimulationMetrics {
    pub fn compute(buses: &[Bus], passengers: &[Passenger], now_ms: u64) -> Self {
        let mut waiting = 0;
        let mut on_board = 0;
        let mut completed = 0;
        let mut total_wait_ms = 0u64;

        for passenger in passengers {
            match passenger.status {
                PassengerStatus::Waiting => {
                    waiting += 1;
                    total_wait_ms += now_ms.saturating_sub(passenger.request_ms);
                }
                PassengerStatus::OnBoard => on_board += 1,
                PassengerStatus::Completed => completed += 1,
            }
        }

        let average_wait_secs = if waiting > 0 {
            total_wait_ms as f64 / 1_000.0 / waiting as f64
        } else {
            0.0
        };

        let buses_idle = buses.iter().filter(|bus| is_idle(bus.state)).count();
        let buses_active = buses.len() - buses_idle;
        let fleet_utilization = if buses.is_empty() {
            0.0
        } else {
            buses_active as f64 / buses.len() as f64 * 100.0
        };

        Self {
            average_wait_secs,
            passengers_waiting: waiting,
            passengers_on_board: on_board,
            passengers_served_total: completed,
            fleet_utilization,
            buses_active,
            buses_idle,
        }
    }

    pub fn wait_status(&self) -> WaitTimeStatus {
        WaitTimeStatus::from_secs(self.average_wait_secs)
    }
}

/// Service level of the average wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaitTimeStatus {
    /// Up to five minutes.
    Good,
    /// Up to ten minutes.
    Warning,
    Critical,
}

impl WaitTimeStatus {
    pub fn from_secs(average_wait_secs: f64) -> Self {
        if average_wait_secs <= 300.0 {
            WaitTimeStatus::Good
        } else if average_wait_secs <= 600.0 {
            WaitTimeStatus::Warning
        } else {
            WaitTimeStatus::Critical
        }
    }
}

/// `"45s"`, `"2m"`, `"2m 5s"`.
pub fn format_wait_time(secs: f64) -> String {
    if secs < 60.0 {
        return format!("{}s", secs.round() as u64);
    }
    let minutes = (secs / 60.0).floor() as u64;
    let remainder = (secs % 60.0).round() as u64;
    if remainder > 0 {
        format!("{minutes}m {remainder}s")
    } else {
        format!("{minutes}m")
    }
}

/// Seconds of travel assumed per remaining path point.
const SECONDS_PER_PATH_POINT: f64 = 1.0;

/// Estimated seconds until a bus with `path_len` remaining waypoints arrives.
pub fn eta_secs(path_len: usize) -> f64 {
    path_len as f64 * SECONDS_PER_PATH_POINT
}

/// Arrival estimate for display: `"Calculating..."` while no path is known,
/// `"Arriving..."` under 30 s, then `"45s"`, `"1min 20s"` or `"3 min"`.
pub fn format_eta(path_len: usize) -> String {
    if path_len == 0 {
        return String::from("Calculating...");
    }
    let total = eta_secs(path_len);
    if total < 30.0 {
        return String::from("Arriving...");
    }
    let minutes = (total / 60.0).floor() as u64;
    let seconds = (total % 60.0).floor() as u64;
    match minutes {
        0 => format!("{seconds}s"),
        1 => format!("{minutes}min {seconds}s"),
        _ => format!("{minutes} min"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{BusId, BusState, PassengerId};
    use crate::geo::Coordinate;

    fn waiting_since(id: u64, request_ms: u64) -> Passenger {
        let at = Coordinate::new(0.0, 0.0);
        Passenger::new(PassengerId(id), at, at, request_ms, true)
    }

    #[test]
    fn average_wait_is_the_mean_over_waiting_passengers() {
        let now = 60_000;
        let passengers = vec![waiting_since(1, now - 10_000), waiting_since(2, now - 20_000)];
        let metrics = SimulationMetrics::compute(&[], &passengers, now);
        assert_eq!(metrics.average_wait_secs, 15.0);
        assert_eq!(metrics.passengers_waiting, 2);
    }

    #[test]
    fn completed_and_on_board_do_not_count_towards_wait() {
        let mut riding = waiting_since(1, 0);
        riding.status = PassengerStatus::OnBoard;
        let mut done = waiting_since(2, 0);
        done.status = PassengerStatus::Completed;

        let metrics = SimulationMetrics::compute(&[], &[riding, done], 90_000);
        assert_eq!(metrics.average_wait_secs, 0.0);
        assert_eq!(metrics.passengers_on_board, 1);
        assert_eq!(metrics.passengers_served_total, 1);
    }

    #[test]
    fn utilization_counts_non_idle_buses() {
        let at = Coordinate::new(0.0, 0.0);
        let mut buses: Vec<Bus> = (1..=4).map(|i| Bus::new(BusId(i), "b", at, 0)).collect();
        buses[0].state = BusState::Boarding;
        buses[1].state = BusState::Cruising;

        let metrics = SimulationMetrics::compute(&buses, &[], 0);
        assert_eq!(metrics.buses_active, 1);
        assert_eq!(metrics.buses_idle, 3);
        assert_eq!(metrics.fleet_utilization, 25.0);
        assert_eq!(SimulationMetrics::compute(&[], &[], 0).fleet_utilization, 0.0);
    }

    #[test]
    fn wait_time_formatting() {
        assert_eq!(format_wait_time(42.4), "42s");
        assert_eq!(format_wait_time(120.0), "2m");
        assert_eq!(format_wait_time(125.0), "2m 5s");
    }

    #[test]
    fn status_bands() {
        assert_eq!(WaitTimeStatus::from_secs(300.0), WaitTimeStatus::Good);
        assert_eq!(WaitTimeStatus::from_secs(300.5), WaitTimeStatus::Warning);
        assert_eq!(WaitTimeStatus::from_secs(601.0), WaitTimeStatus::Critical);
    }

    #[test]
    fn eta_follows_remaining_path_points() {
        assert_eq!(eta_secs(0), 0.0);
        assert_eq!(eta_secs(90), 90.0);
        assert_eq!(format_eta(0), "Calculating...");
        assert_eq!(format_eta(29), "Arriving...");
        assert_eq!(format_eta(45), "45s");
        assert_eq!(format_eta(80), "1min 20s");
        assert_eq!(format_eta(200), "3 min");
    }
}
