use std::time::Duration;

/// Runtime tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Interval between running-state polls. The first poll runs at startup.
    pub poll_interval: Duration,
    /// Commands buffered before callers wait for the runtime.
    pub command_queue_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(2), command_queue_depth: 32 }
    }
}
