//! Read-side seams to the agent registry and the router/port backend.
//!
//! The scheduler never owns agents, routers, or ports; it reads them through
//! [`AgentRegistry`] and [`RouterBackend`]. [`StoreRegistry`] implements both
//! on top of the [`StateStore`] the bindings live in.

use std::time::{SystemTime, UNIX_EPOCH};

use l3sched_core::SchedulerConfig;
use l3sched_state::*;

/// Restrictions applied by [`AgentRegistry::get_l3_agents`].
#[derive(Debug, Clone, Default)]
pub struct AgentFilters {
    pub host: Option<String>,
    pub agent_mode: Option<AgentMode>,
}

impl AgentFilters {
    fn matches(&self, agent: &Agent) -> bool {
        self.host.as_deref().is_none_or(|h| agent.host == h)
            && self.agent_mode.as_ref().is_none_or(|m| agent.mode() == *m)
    }
}

/// Source of agent identity, liveness, and configuration.
pub trait AgentRegistry: Send + Sync {
    /// List L3 agents.
    ///
    /// `active` filters on administrative state when set. Agents whose
    /// heartbeat is stale are dropped unless `include_down` is true.
    fn get_l3_agents(
        &self,
        active: Option<bool>,
        filters: &AgentFilters,
        include_down: bool,
    ) -> StateResult<Vec<Agent>>;

    fn get_l3_agent(&self, agent_id: &str) -> StateResult<Option<Agent>>;

    fn get_l3_agent_by_host(&self, host: &str) -> StateResult<Option<Agent>>;

    /// Whether a heartbeat at `heartbeat_timestamp` means the agent is down.
    fn is_agent_down(&self, heartbeat_timestamp: u64) -> bool;

    /// Agent configuration with defaults applied.
    fn get_configuration_dict(&self, agent: &Agent) -> AgentConfiguration {
        agent.configuration.with_defaults()
    }
}

/// Source of routers and of the ports used for DVR locality checks.
pub trait RouterBackend: Send + Sync {
    fn get_router(&self, router_id: &str) -> StateResult<Option<Router>>;

    fn list_routers(&self) -> StateResult<Vec<Router>>;

    fn get_ports(&self, filter: &PortFilter) -> StateResult<Vec<Port>>;
}

/// Registry and backend served from the scheduler's own state store.
#[derive(Clone)]
pub struct StoreRegistry {
    state: StateStore,
    agent_down_time: u64,
}

impl StoreRegistry {
    pub fn new(state: StateStore, config: &SchedulerConfig) -> Self {
        Self {
            state,
            agent_down_time: config.agent_down_time,
        }
    }

    /// Ingest an agent's state report: upsert the record and stamp the
    /// heartbeat with the current time.
    pub fn report_state(&self, agent: &Agent) -> StateResult<()> {
        let mut agent = agent.clone();
        agent.heartbeat_timestamp = epoch_secs();
        self.state.put_agent(&agent)
    }

    /// Refresh the heartbeat of a known agent. Returns false for unknown ids.
    pub fn heartbeat(&self, agent_id: &str) -> StateResult<bool> {
        self.state.touch_agent(agent_id, epoch_secs())
    }
}

impl AgentRegistry for StoreRegistry {
    fn get_l3_agents(
        &self,
        active: Option<bool>,
        filters: &AgentFilters,
        include_down: bool,
    ) -> StateResult<Vec<Agent>> {
        Ok(self
            .state
            .list_agents()?
            .into_iter()
            .filter(|a| active.is_none_or(|up| a.admin_state_up == up))
            .filter(|a| filters.matches(a))
            .filter(|a| include_down || !self.is_agent_down(a.heartbeat_timestamp))
            .collect())
    }

    fn get_l3_agent(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        self.state.get_agent(agent_id)
    }

    fn get_l3_agent_by_host(&self, host: &str) -> StateResult<Option<Agent>> {
        self.state.get_agent_by_host(host)
    }

    fn is_agent_down(&self, heartbeat_timestamp: u64) -> bool {
        epoch_secs().saturating_sub(heartbeat_timestamp) > self.agent_down_time
    }
}

impl RouterBackend for StoreRegistry {
    fn get_router(&self, router_id: &str) -> StateResult<Option<Router>> {
        self.state.get_router(router_id)
    }

    fn list_routers(&self) -> StateResult<Vec<Router>> {
        self.state.list_routers()
    }

    fn get_ports(&self, filter: &PortFilter) -> StateResult<Vec<Port>> {
        self.state.list_ports(filter)
    }
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
