//! Liveness arithmetic for the failover sweep.
//!
//! Tracks when the previous sweep ran so a wall-clock jump (host suspend,
//! NTP step) is not mistaken for every agent dying at once.

use std::time::Duration;

use tracing::debug;

use l3sched_core::SchedulerConfig;

/// Per-monitor liveness state.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    agent_down_time: u64,
    agent_dead_limit: u64,
    last_check: Option<u64>,
}

impl LivenessTracker {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            agent_down_time: config.agent_down_time,
            agent_dead_limit: config.agent_dead_limit(),
            last_check: None,
        }
    }

    /// Heartbeat age after which an agent's routers are moved.
    pub fn dead_limit(&self) -> Duration {
        Duration::from_secs(self.agent_dead_limit)
    }

    /// Agents with a heartbeat strictly older than this are dead at `now`.
    pub fn dead_cutoff(&self, now: u64) -> u64 {
        now.saturating_sub(self.agent_dead_limit)
    }

    /// Whether more than `agent_down_time` passed since the last recorded
    /// sweep. Always false before the first sweep.
    pub fn clock_jumped(&self, now: u64) -> bool {
        match self.last_check {
            Some(last) => {
                let elapsed = now.saturating_sub(last);
                debug!(elapsed, "time since last failover check");
                elapsed > self.agent_down_time
            }
            None => false,
        }
    }

    pub fn record_check(&mut self, now: u64) {
        self.last_check = Some(now);
    }

    pub fn last_check(&self) -> Option<u64> {
        self.last_check
    }
}
