//! Engine configuration

use std::time::Duration;

/// Process-wide engine knobs. All values have working defaults; embedding
/// programs override fields before handing the config to the coordinator.
#[derive(Debug, Clone)]
pub struct Config {
    /// How many times a restartable abort re-runs the transaction body.
    pub max_restarts: u32,
    /// Upper bound on any single wait for an uncommitted peer version.
    pub wait_timeout: Duration,
    /// Minimum interval between opportunistic version GC passes.
    pub gc_interval: Duration,
    /// First timestamp handed out by the controller.
    pub initial_timestamp: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            wait_timeout: Duration::from_secs(2),
            gc_interval: Duration::from_secs(1),
            initial_timestamp: 1,
        }
    }
}

impl Config {
    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn gc_interval(mut self, gc_interval: Duration) -> Self {
        self.gc_interval = gc_interval;
        self
    }

    pub fn initial_timestamp(mut self, initial_timestamp: u64) -> Self {
        self.initial_timestamp = initial_timestamp;
        self
    }
}
