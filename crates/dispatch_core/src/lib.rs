pub mod autoscale;
pub mod clock;
pub mod config;
pub mod demand;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod lease;
pub mod lifecycle;
pub mod matching;
pub mod metrics;
pub mod movement;
pub mod routing;
pub mod runner;
pub mod stops;
pub mod store;
pub mod telemetry;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
