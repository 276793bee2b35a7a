//! The binding manager, sole writer of router/agent bindings.
//!
//! Bind races (the pair already exists, either end was deleted meanwhile,
//! another agent won the exclusive slot) are absorbed: they are logged and
//! reported through [`BindOutcome`], never raised.

use std::sync::Arc;

use tracing::{debug, info};

use l3sched_state::*;

use crate::error::{SchedulerError, SchedulerResult};
use crate::registry::AgentRegistry;

#[derive(Clone)]
pub struct BindingManager {
    state: StateStore,
    registry: Arc<dyn AgentRegistry>,
}

impl BindingManager {
    pub fn new(state: StateStore, registry: Arc<dyn AgentRegistry>) -> Self {
        Self { state, registry }
    }

    /// Add `agent` to the hosts of `router_id`.
    pub fn bind_router(&self, router_id: &str, agent: &Agent) -> SchedulerResult<BindOutcome> {
        let outcome = self.state.insert_binding(router_id, &agent.id)?;
        log_outcome(router_id, &agent.id, &outcome);
        Ok(outcome)
    }

    /// Bind `agent` as the single host of `router_id`.
    ///
    /// Loses silently with [`BindOutcome::AlreadyHosted`] when another agent
    /// got there first.
    pub fn bind_router_exclusive(
        &self,
        router_id: &str,
        agent: &Agent,
    ) -> SchedulerResult<BindOutcome> {
        let outcome = self.state.insert_exclusive_binding(router_id, &agent.id)?;
        log_outcome(router_id, &agent.id, &outcome);
        Ok(outcome)
    }

    pub fn unbind_router(&self, router_id: &str, agent_id: &str) -> SchedulerResult<()> {
        if !self.state.remove_binding(router_id, agent_id)? {
            return Err(SchedulerError::BindingNotFound {
                router_id: router_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
        info!(%router_id, %agent_id, "router unbound from l3 agent");
        Ok(())
    }

    /// Remove every binding of `router_id`, returning the agents it was
    /// removed from. Bindings deleted concurrently are skipped.
    pub fn unbind_all(&self, router_id: &str) -> SchedulerResult<Vec<AgentId>> {
        let mut removed = Vec::new();
        for binding in self.state.list_router_bindings(router_id)? {
            match self.unbind_router(router_id, &binding.agent_id) {
                Ok(()) => removed.push(binding.agent_id),
                Err(SchedulerError::BindingNotFound { .. }) => {
                    debug!(%router_id, agent_id = %binding.agent_id, "binding already removed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Agents currently hosting `router_id`, with their registry records.
    pub fn get_routers_hosting(&self, router_id: &str) -> SchedulerResult<Vec<(AgentId, Agent)>> {
        let mut hosting = Vec::new();
        for binding in self.state.list_router_bindings(router_id)? {
            if let Some(agent) = self.registry.get_l3_agent(&binding.agent_id)? {
                hosting.push((binding.agent_id, agent));
            }
        }
        Ok(hosting)
    }

    pub fn bind_snat(&self, router_id: &str, agent: &Agent) -> SchedulerResult<BindOutcome> {
        let outcome = self.state.insert_snat_binding(router_id, &agent.id)?;
        match &outcome {
            BindOutcome::Created => {
                info!(%router_id, agent_id = %agent.id, "snat bound to l3 agent");
            }
            other => debug!(%router_id, agent_id = %agent.id, outcome = ?other, "snat bind absorbed"),
        }
        Ok(outcome)
    }

    /// Agent hosting the SNAT part of `router_id`, if any.
    pub fn snat_binding(&self, router_id: &str) -> SchedulerResult<Option<AgentId>> {
        Ok(self.state.get_snat_binding(router_id)?.map(|b| b.agent_id))
    }

    pub fn unbind_snat(&self, router_id: &str) -> SchedulerResult<bool> {
        let existed = self.state.remove_snat_binding(router_id)?;
        if existed {
            info!(%router_id, "snat unbound");
        }
        Ok(existed)
    }
}

fn log_outcome(router_id: &str, agent_id: &str, outcome: &BindOutcome) {
    match outcome {
        BindOutcome::Created => info!(%router_id, %agent_id, "router bound to l3 agent"),
        BindOutcome::AlreadyBound => {
            debug!(%router_id, %agent_id, "router already bound to l3 agent")
        }
        BindOutcome::AlreadyHosted { agent_id: holder } => {
            debug!(%router_id, %agent_id, %holder, "router already hosted by another l3 agent")
        }
        BindOutcome::RouterGone => debug!(%router_id, %agent_id, "router deleted before bind"),
        BindOutcome::AgentGone => debug!(%router_id, %agent_id, "l3 agent deleted before bind"),
    }
}
