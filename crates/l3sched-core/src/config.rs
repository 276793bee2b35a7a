//! Scheduler configuration parser.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("agent_down_time must be at least 1 second")]
    ZeroAgentDownTime,

    #[error("unknown router scheduler driver: {0}")]
    UnknownDriver(String),
}

/// Which placement strategy picks an agent for a centralized router.
///
/// Chosen once at process start; every scheduling call in the process
/// uses the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerDriver {
    /// Uniform random pick among candidates.
    Chance,
    /// Pick the candidate hosting the fewest routers.
    #[default]
    LeastRouters,
}

impl fmt::Display for SchedulerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chance => f.write_str("chance"),
            Self::LeastRouters => f.write_str("least_routers"),
        }
    }
}

impl FromStr for SchedulerDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "chance" => Ok(Self::Chance),
            "least_routers" | "least-routers" => Ok(Self::LeastRouters),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

/// Immutable scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Strategy used to pick one agent for a centralized router.
    pub router_scheduler_driver: SchedulerDriver,
    /// Schedule unhosted routers when an agent syncs.
    pub router_auto_schedule: bool,
    /// Move routers off agents whose heartbeat went stale.
    pub allow_automatic_l3agent_failover: bool,
    /// Permit manual binds to administratively disabled agents.
    pub allow_router_schedule_down_agent: bool,
    /// Seconds without a heartbeat before an agent counts as down.
    pub agent_down_time: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            router_scheduler_driver: SchedulerDriver::default(),
            router_auto_schedule: true,
            allow_automatic_l3agent_failover: false,
            allow_router_schedule_down_agent: false,
            agent_down_time: 75,
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_down_time == 0 {
            return Err(ConfigError::ZeroAgentDownTime);
        }
        Ok(())
    }

    /// Heartbeat age (seconds) after which an agent's routers are moved.
    pub fn agent_dead_limit(&self) -> u64 {
        self.agent_down_time.saturating_mul(2)
    }

    /// Period of the failover check loop.
    pub fn failover_interval(&self) -> Duration {
        Duration::from_secs((self.agent_down_time / 2).max(1))
    }
}
