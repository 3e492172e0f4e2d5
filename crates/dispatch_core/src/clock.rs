use tokio::time::Instant;

/// Milliseconds elapsed since the engine started.
///
/// Backed by `tokio::time::Instant`, so paused test runtimes advance it
/// deterministically together with every interval and timeout.
#[derive(Debug, Clone, Copy)]
pub struct SimulationClock {
    origin: Instant,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
