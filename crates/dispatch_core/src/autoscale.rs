//! Fleet auto-scaling.
//!
//! [`decide`] is a pure function of the current fleet, passengers and metrics.
//! It neither applies its decision nor limits how often it runs; callers that
//! act on it go through a [`ScaleThrottle`] so add/remove actions cannot
//! oscillate faster than `min_apply_interval_ms`.
//!
//! Rules, first match wins:
//!
//! 1. Average wait above the threshold with someone waiting: grow with the backlog.
//! 2. More than 1.5x the per-bus target riding each active bus: grow by one.
//! 3. Mostly idle fleet with light demand: shrink to demand plus one bus.
//! 4. Nobody active: shrink to the minimum.
//! 5. Below the minimum: grow to it.
//! 6. Otherwise maintain.

use std::fmt;

use serde::Serialize;

use crate::config::FleetScaleConfig;
use crate::fleet::{Bus, Passenger, PassengerStatus};
use crate::lifecycle::is_idle;
use crate::metrics::SimulationMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScaleAction {
    Add,
    Remove,
    Maintain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleDecision {
    pub recommended_bus_count: usize,
    pub current_bus_count: usize,
    pub action: ScaleAction,
    pub reason: String,
    /// Active passengers relative to `buses * passengers_per_bus`, capped at 100.
    pub demand_score: f64,
    /// Percentage of buses serving a job.
    pub efficiency_score: f64,
}

impl ScaleDecision {
    /// Reason prefixed with the signed bus delta, e.g. `"+2 buses: ..."`.
    pub fn describe(&self) -> String {
        match self.action {
            ScaleAction::Add => format!(
                "+{} buses: {}",
                self.recommended_bus_count
                    .saturating_sub(self.current_bus_count),
                self.reason
            ),
            ScaleAction::Remove => format!(
                "-{} buses: {}",
                self.current_bus_count
                    .saturating_sub(self.recommended_bus_count),
                self.reason
            ),
            ScaleAction::Maintain => self.reason.clone(),
        }
    }
}

impl fmt::Display for ScaleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

pub fn decide(
    buses: &[Bus],
    passengers: &[Passenger],
    metrics: &SimulationMetrics,
    config: &FleetScaleConfig,
) -> ScaleDecision {
    let current = buses.len();
    let per_bus = config.passengers_per_bus.max(1);

    let waiting = passengers
        .iter()
        .filter(|p| p.status == PassengerStatus::Waiting)
        .count();
    let on_board = passengers
        .iter()
        .filter(|p| p.status == PassengerStatus::OnBoard)
        .count();
    let active_passengers = waiting + on_board;

    let idle_buses = buses
        .iter()
        .filter(|bus| is_idle(bus.state) && bus.assignment.is_none())
        .count();
    let active_buses = current - idle_buses;

    let demand_score = if current == 0 {
        if active_passengers > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (active_passengers as f64 / (current * per_bus) as f64 * 100.0).min(100.0)
    };
    let efficiency_score = if current == 0 {
        0.0
    } else {
        active_buses as f64 / current as f64 * 100.0
    };

    let decision = |recommended: usize, action: ScaleAction, reason: String| ScaleDecision {
        recommended_bus_count: recommended,
        current_bus_count: current,
        action,
        reason,
        demand_score,
        efficiency_score,
    };

    let wait = metrics.average_wait_secs;
    if wait > config.scale_up_threshold_secs && waiting > 0 && current < config.max_buses {
        let buses_needed = waiting.div_ceil(per_bus);
        let recommended = config
            .max_buses
            .min((current + 1).max(current + buses_needed.div_ceil(2)));
        return decision(
            recommended,
            ScaleAction::Add,
            format!("average wait {}s with {waiting} waiting", wait.round()),
        );
    }

    let per_active_bus = if active_buses > 0 {
        active_passengers as f64 / active_buses as f64
    } else {
        active_passengers as f64
    };
    if per_active_bus > per_bus as f64 * 1.5 && current < config.max_buses {
        return decision(
            config.max_buses.min(current + 1),
            ScaleAction::Add,
            format!("overloaded: {per_active_bus:.1} passengers per bus"),
        );
    }

    if current > 0 {
        let idle_ratio = idle_buses as f64 / current as f64;
        if idle_ratio > 0.5 && active_passengers < current && current > config.min_buses {
            let needed = config
                .min_buses
                .max(active_passengers.div_ceil(per_bus) + 1);
            if needed < current {
                return decision(
                    needed,
                    ScaleAction::Remove,
                    format!("{idle_buses} idle buses, demand of {active_passengers} passengers"),
                );
            }
        }
    }

    if active_passengers == 0 && current > config.min_buses {
        return decision(
            config.min_buses,
            ScaleAction::Remove,
            String::from("no active passengers"),
        );
    }

    if current < config.min_buses {
        return decision(
            config.min_buses,
            ScaleAction::Add,
            format!("fleet below minimum ({})", config.min_buses),
        );
    }

    decision(current, ScaleAction::Maintain, String::from("fleet balanced"))
}

/// Rate limit for applying add/remove decisions.
#[derive(Debug, Clone)]
pub struct ScaleThrottle {
    min_interval_ms: u64,
    last_applied_ms: Option<u64>,
}

impl ScaleThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_applied_ms: None,
        }
    }

    /// True if `decision` should be applied now; records the apply time when it is.
    pub fn permit(&mut self, decision: &ScaleDecision, now_ms: u64) -> bool {
        if decision.action == ScaleAction::Maintain
            || decision.recommended_bus_count == decision.current_bus_count
        {
            return false;
        }
        if let Some(last) = self.last_applied_ms {
            if now_ms.saturating_sub(last) < self.min_interval_ms {
                return false;
            }
        }
        self.last_applied_ms = Some(now_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Assignment, BusId, BusState, PassengerId};
    use crate::geo::Coordinate;

    const AT: Coordinate = Coordinate::new(0.0, 0.0);

    fn fleet(n: u64) -> Vec<Bus> {
        (1..=n).map(|i| Bus::new(BusId(i), "b", AT, 0)).collect()
    }

    fn waiting(n: u64) -> Vec<Passenger> {
        (1..=n)
            .map(|i| Passenger::new(PassengerId(i), AT, AT, 0, true))
            .collect()
    }

    fn busy(bus: &mut Bus, passenger: u64) {
        bus.state = BusState::GoingToDropoff;
        bus.assignment = Some(Assignment {
            passenger_id: PassengerId(passenger),
            pickup_location: AT,
            dropoff_location: AT,
            pickup_path: Vec::new(),
            dropoff_path: Vec::new(),
        });
    }

    fn metrics_with_wait(secs: f64) -> SimulationMetrics {
        SimulationMetrics {
            average_wait_secs: secs,
            ..SimulationMetrics::default()
        }
    }

    #[test]
    fn idle_fleet_without_demand_shrinks_to_minimum() {
        let buses = fleet(10);
        let decision = decide(
            &buses,
            &[],
            &SimulationMetrics::default(),
            &FleetScaleConfig::default(),
        );
        assert_eq!(decision.action, ScaleAction::Remove);
        assert_eq!(decision.recommended_bus_count, 3);
        assert_eq!(decision.current_bus_count, 10);
        assert_eq!(
            decision.describe(),
            "-7 buses: 10 idle buses, demand of 0 passengers"
        );
    }

    #[test]
    fn long_waits_grow_with_the_backlog() {
        let buses = fleet(4);
        let passengers = waiting(12);
        let decision = decide(
            &buses,
            &passengers,
            &metrics_with_wait(400.0),
            &FleetScaleConfig::default(),
        );
        // 12 waiting / 3 per bus = 4 needed, half of that added.
        assert_eq!(decision.action, ScaleAction::Add);
        assert_eq!(decision.recommended_bus_count, 6);
    }

    #[test]
    fn growth_is_capped_at_maximum() {
        let buses = fleet(19);
        let decision = decide(
            &buses,
            &waiting(60),
            &metrics_with_wait(900.0),
            &FleetScaleConfig::default(),
        );
        assert_eq!(decision.recommended_bus_count, 20);
    }

    #[test]
    fn overloaded_active_buses_add_one() {
        let mut buses = fleet(4);
        for (i, bus) in buses.iter_mut().enumerate() {
            busy(bus, 100 + i as u64);
        }
        let decision = decide(
            &buses,
            &waiting(20),
            &metrics_with_wait(10.0),
            &FleetScaleConfig::default(),
        );
        assert_eq!(decision.action, ScaleAction::Add);
        assert_eq!(decision.recommended_bus_count, 5);
    }

    #[test]
    fn below_minimum_grows_to_minimum() {
        let mut only = fleet(1);
        busy(&mut only[0], 1);
        let mut riders = waiting(1);
        riders[0].status = PassengerStatus::OnBoard;
        let decision = decide(
            &only,
            &riders,
            &SimulationMetrics::default(),
            &FleetScaleConfig::default(),
        );
        assert_eq!(decision.action, ScaleAction::Add);
        assert_eq!(decision.recommended_bus_count, 3);
    }

    #[test]
    fn balanced_fleet_is_maintained() {
        let mut buses = fleet(3);
        busy(&mut buses[0], 1);
        busy(&mut buses[1], 2);
        let decision = decide(
            &buses,
            &waiting(3),
            &metrics_with_wait(30.0),
            &FleetScaleConfig::default(),
        );
        assert_eq!(decision.action, ScaleAction::Maintain);
        assert_eq!(decision.recommended_bus_count, 3);
        assert!((decision.efficiency_score - 200.0 / 3.0).abs() < 1e-9);
        assert!((decision.demand_score - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_fleet_scores_are_finite() {
        let decision = decide(
            &[],
            &[],
            &SimulationMetrics::default(),
            &FleetScaleConfig::default(),
        );
        assert_eq!(decision.efficiency_score, 0.0);
        assert_eq!(decision.demand_score, 0.0);
        assert_eq!(decision.action, ScaleAction::Add);
    }

    #[test]
    fn throttle_spaces_out_applied_actions() {
        let buses = fleet(10);
        let decision = decide(
            &buses,
            &[],
            &SimulationMetrics::default(),
            &FleetScaleConfig::default(),
        );
        let mut throttle = ScaleThrottle::new(5_000);
        assert!(throttle.permit(&decision, 1_000));
        assert!(!throttle.permit(&decision, 5_999));
        assert!(throttle.permit(&decision, 6_000));
    }
}
