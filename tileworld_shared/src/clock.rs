//! Simulation clock.

use std::time::Duration;

/// Per-tick time supplied by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimTime {
    /// Number of completed ticks.
    pub frame: u64,
    /// Absolute simulation time in nanoseconds.
    pub time: i64,
    /// Seconds elapsed during the last tick.
    pub tpf: f64,
}

impl SimTime {
    /// Advances by one tick of length `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.frame += 1;
        self.time = self
            .time
            .saturating_add(i64::try_from(dt.as_nanos()).unwrap_or(i64::MAX));
        self.tpf = dt.as_secs_f64();
    }
}
