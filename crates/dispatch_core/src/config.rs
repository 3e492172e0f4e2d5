use serde::{Deserialize, Serialize};

/// Fleet auto-scaling bounds and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetScaleConfig {
    pub min_buses: usize,
    pub max_buses: usize,
    /// Target number of active passengers per bus.
    pub passengers_per_bus: usize,
    /// Average wait (seconds) above which the fleet grows.
    pub scale_up_threshold_secs: f64,
    pub evaluation_interval_ms: u64,
    /// Minimum spacing between two applied add/remove actions.
    pub min_apply_interval_ms: u64,
}

impl Default for FleetScaleConfig {
    fn default() -> Self {
        Self {
            min_buses: 3,
            max_buses: 20,
            passengers_per_bus: 3,
            scale_up_threshold_secs: 300.0,
            evaluation_interval_ms: 5_000,
            min_apply_interval_ms: 5_000,
        }
    }
}

/// Periods of the independently scheduled tasks (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskIntervals {
    pub matching_ms: u64,
    pub cruising_ms: u64,
    /// Lifecycle + movement; one tick is one animation frame.
    pub tick_ms: u64,
    pub cleanup_ms: u64,
    pub demand_ms: u64,
}

impl Default for TaskIntervals {
    fn default() -> Self {
        Self {
            matching_ms: 200,
            cruising_ms: 500,
            tick_ms: 16,
            cleanup_ms: 15_000,
            demand_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Dwell time for both boarding and disembarking.
    pub boarding_ms: u64,
    /// How long a bus sits `Available` before it is sent cruising.
    pub cruise_grace_ms: u64,
    /// Degrees travelled per tick at speed multiplier 1.
    pub base_speed_per_tick: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            boarding_ms: 3_000,
            cruise_grace_ms: 1_000,
            base_speed_per_tick: 0.000_002_5,
        }
    }
}

/// Route Path Provider limits and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    /// Backoff after a rate-limited / unavailable response, multiplied by the attempt number.
    pub rate_limit_backoff_ms: u64,
    /// Backoff after a transport error or timeout, multiplied by the attempt number.
    pub error_backoff_ms: u64,
    pub cache_capacity: usize,
    /// Points beyond this are dropped before calling the resolver.
    pub max_points: usize,
    /// Decimal places kept when building cache keys.
    pub key_precision: usize,
    pub endpoint: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_attempts: 3,
            attempt_timeout_ms: 8_000,
            rate_limit_backoff_ms: 1_000,
            error_backoff_ms: 500,
            cache_capacity: 500,
            max_points: 15,
            key_precision: 4,
            endpoint: String::from("https://router.project-osrm.org"),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub speed_multiplier: f64,
    pub is_paused: bool,
    pub fleet_auto_scale: bool,
    /// Unassigned waiting bots the demand task tries to keep in the system.
    pub target_waiting_bots: usize,
    pub simulated_hour: u32,
    pub use_realistic_demand: bool,
    /// RNG seed for cruising and demand; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub fleet: FleetScaleConfig,
    pub intervals: TaskIntervals,
    pub lifecycle: LifecycleConfig,
    pub routing: RoutingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            is_paused: false,
            fleet_auto_scale: true,
            target_waiting_bots: 10,
            simulated_hour: 8,
            use_realistic_demand: true,
            seed: None,
            fleet: FleetScaleConfig::default(),
            intervals: TaskIntervals::default(),
            lifecycle: LifecycleConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_speed_multiplier(mut self, multiplier: f64) -> Self {
        self.speed_multiplier = multiplier.max(0.0);
        self
    }

    pub fn with_fleet_bounds(mut self, min_buses: usize, max_buses: usize) -> Self {
        self.fleet.min_buses = min_buses;
        self.fleet.max_buses = max_buses.max(min_buses);
        self
    }

    pub fn with_auto_scale(mut self, enabled: bool) -> Self {
        self.fleet_auto_scale = enabled;
        self
    }

    pub fn with_target_waiting_bots(mut self, target: usize) -> Self {
        self.target_waiting_bots = target;
        self
    }

    pub fn with_simulated_hour(mut self, hour: u32) -> Self {
        self.simulated_hour = hour % 24;
        self
    }

    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_intervals(mut self, intervals: TaskIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Distance a moving bus covers in one tick; never negative.
    pub fn travel_per_tick(&self) -> f64 {
        (self.lifecycle.base_speed_per_tick * self.speed_multiplier).max(0.0)
    }
}
