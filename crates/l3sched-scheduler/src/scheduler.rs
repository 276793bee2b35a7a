//! Router scheduler — places routers on L3 agents.
//!
//! `RouterScheduler` is the single entry point for both automatic and
//! administrator-driven placement:
//! - `schedule_router` places one router (single owner or fan-out)
//! - `reschedule_router` moves a router by unbinding and scheduling again
//! - `auto_schedule_routers` picks up unhosted routers when an agent syncs
//! - the manual add/remove/list calls back the administrative API

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use l3sched_core::SchedulerConfig;
use l3sched_state::*;

use crate::binding::BindingManager;
use crate::error::{SchedulerError, SchedulerResult};
use crate::filter::{CandidateFilter, Rejection};
use crate::policy::SchedulingPolicy;
use crate::registry::{AgentFilters, AgentRegistry, RouterBackend, StoreRegistry};

/// Per-call scheduling scope. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct SchedulingHints {
    /// Only agents with local workload on this subnet qualify for a
    /// distributed router.
    pub subnet_id: Option<String>,
    /// The router is known to have an external gateway.
    pub gw_exists: bool,
}

/// Result of a scheduling call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "agents", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// New bindings were created to these agents.
    Scheduled(Vec<AgentId>),
    /// Nothing new was needed; these agents already host the router.
    AlreadyScheduled(Vec<AgentId>),
    /// No eligible agent. Automatic callers retry on a later trigger.
    NoAssignment,
}

impl ScheduleOutcome {
    pub fn agents(&self) -> &[AgentId] {
        match self {
            Self::Scheduled(agents) | Self::AlreadyScheduled(agents) => agents,
            Self::NoAssignment => &[],
        }
    }

    pub fn is_assigned(&self) -> bool {
        !self.agents().is_empty()
    }
}

/// Places routers on L3 agents.
///
/// Holds no in-process locks; every mutation is a store transaction, so
/// several schedulers and tasks may share one store handle. The store
/// itself is owned by a single process.
pub struct RouterScheduler {
    config: SchedulerConfig,
    state: StateStore,
    registry: Arc<dyn AgentRegistry>,
    backend: Arc<dyn RouterBackend>,
    filter: CandidateFilter,
    policy: SchedulingPolicy,
    bindings: BindingManager,
}

impl RouterScheduler {
    /// Scheduler whose registry and router backend are the store itself.
    pub fn new(config: SchedulerConfig, state: StateStore) -> Self {
        let registry = Arc::new(StoreRegistry::new(state.clone(), &config));
        Self::with_backends(config, state, registry.clone(), registry)
    }

    pub fn with_backends(
        config: SchedulerConfig,
        state: StateStore,
        registry: Arc<dyn AgentRegistry>,
        backend: Arc<dyn RouterBackend>,
    ) -> Self {
        let policy = SchedulingPolicy::from_driver(config.router_scheduler_driver);
        debug!(driver = %config.router_scheduler_driver, "router scheduler created");
        Self {
            filter: CandidateFilter::new(registry.clone(), backend.clone()),
            bindings: BindingManager::new(state.clone(), registry.clone()),
            config,
            state,
            registry,
            backend,
            policy,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Place `router_id` on eligible agents.
    ///
    /// A centralized router that already has a host is left alone. When
    /// `candidates` is `None` they are computed from the live, admin-up
    /// agents. Reserved agents never receive new routers.
    pub fn schedule_router(
        &self,
        router_id: &str,
        candidates: Option<Vec<Agent>>,
        hints: Option<&SchedulingHints>,
    ) -> SchedulerResult<ScheduleOutcome> {
        let router = self.router(router_id)?;

        if !router.distributed {
            let hosts = self.bound_agent_ids(router_id)?;
            if !hosts.is_empty() {
                debug!(%router_id, agents = ?hosts, "router already scheduled");
                return Ok(ScheduleOutcome::AlreadyScheduled(hosts));
            }
        }

        let subnet_id = hints.and_then(|h| h.subnet_id.as_deref());
        let mut candidates = match candidates {
            Some(candidates) => candidates,
            None => self.eligible_agents(&router, subnet_id)?,
        };
        candidates.retain(|a| !a.reserved);
        let gw_exists = hints.is_some_and(|h| h.gw_exists) || router.external_gateway_info.is_some();

        if candidates.is_empty() {
            if router.distributed && !gw_exists {
                self.reconcile_snat(&router, false)?;
            }
            warn!(%router_id, "no eligible l3 agent for router");
            return Ok(ScheduleOutcome::NoAssignment);
        }

        if router.distributed {
            let outcome = self.schedule_distributed(&router, &candidates)?;
            self.reconcile_snat(&router, gw_exists)?;
            Ok(outcome)
        } else {
            self.schedule_centralized(&router, &candidates)
        }
    }

    fn schedule_centralized(
        &self,
        router: &Router,
        candidates: &[Agent],
    ) -> SchedulerResult<ScheduleOutcome> {
        let Some(chosen) = self.policy.choose(candidates, &self.state)? else {
            return Ok(ScheduleOutcome::NoAssignment);
        };
        let outcome = match self.bindings.bind_router_exclusive(&router.id, chosen)? {
            BindOutcome::Created => ScheduleOutcome::Scheduled(vec![chosen.id.clone()]),
            BindOutcome::AlreadyBound => ScheduleOutcome::AlreadyScheduled(vec![chosen.id.clone()]),
            BindOutcome::AlreadyHosted { agent_id } => {
                ScheduleOutcome::AlreadyScheduled(vec![agent_id])
            }
            BindOutcome::RouterGone | BindOutcome::AgentGone => ScheduleOutcome::NoAssignment,
        };
        Ok(outcome)
    }

    fn schedule_distributed(
        &self,
        router: &Router,
        candidates: &[Agent],
    ) -> SchedulerResult<ScheduleOutcome> {
        let bound: HashSet<AgentId> = self.bound_agent_ids(&router.id)?.into_iter().collect();
        let mut created = Vec::new();
        for agent in candidates.iter().filter(|a| !bound.contains(&a.id)) {
            if self.bindings.bind_router(&router.id, agent)?.is_created() {
                created.push(agent.id.clone());
            }
        }
        if !created.is_empty() {
            return Ok(ScheduleOutcome::Scheduled(created));
        }

        let hosts = self.bound_agent_ids(&router.id)?;
        if hosts.is_empty() {
            Ok(ScheduleOutcome::NoAssignment)
        } else {
            Ok(ScheduleOutcome::AlreadyScheduled(hosts))
        }
    }

    /// Give a distributed router with a gateway one SNAT agent, and drop
    /// the SNAT agent of a router whose gateway is gone.
    fn reconcile_snat(&self, router: &Router, gw_exists: bool) -> SchedulerResult<()> {
        let current = self.bindings.snat_binding(&router.id)?;
        if !gw_exists {
            if current.is_some() {
                self.bindings.unbind_snat(&router.id)?;
            }
            return Ok(());
        }
        if current.is_some() {
            return Ok(());
        }

        let filters = AgentFilters {
            agent_mode: Some(AgentMode::DvrSnat),
            ..Default::default()
        };
        let agents = self.registry.get_l3_agents(Some(true), &filters, false)?;
        let mut candidates = self.filter.snat_candidates(router, &agents);
        candidates.retain(|a| !a.reserved);

        match self.policy.choose(&candidates, &self.state)? {
            Some(chosen) => {
                self.bindings.bind_snat(&router.id, chosen)?;
            }
            None => warn!(router_id = %router.id, "no eligible snat agent for router"),
        }
        Ok(())
    }

    /// Move `router_id`: drop every current host (and its SNAT agent), then
    /// schedule again.
    ///
    /// Fails with [`SchedulerError::ReschedulingFailed`] when no agent can
    /// take the router; it is left unhosted in that case.
    pub fn reschedule_router(&self, router_id: &str) -> SchedulerResult<Vec<AgentId>> {
        self.router(router_id)?;
        let removed = self.bindings.unbind_all(router_id)?;
        self.bindings.unbind_snat(router_id)?;

        match self.schedule_router(router_id, None, None)? {
            ScheduleOutcome::NoAssignment => {
                Err(SchedulerError::ReschedulingFailed(router_id.to_string()))
            }
            outcome => {
                let agents = outcome.agents().to_vec();
                info!(%router_id, from = ?removed, to = ?agents, "router rescheduled");
                Ok(agents)
            }
        }
    }

    /// Schedule routers onto the agent on `host` as it syncs.
    ///
    /// Considers `router_ids`, or every router when `None`. Returns `false`
    /// when auto scheduling is off or the host has no usable agent.
    pub fn auto_schedule_routers(
        &self,
        host: &str,
        router_ids: Option<&[RouterId]>,
    ) -> SchedulerResult<bool> {
        if !self.config.router_auto_schedule {
            return Ok(false);
        }
        let Some(agent) = self.registry.get_l3_agent_by_host(host)? else {
            debug!(%host, "no l3 agent on host");
            return Ok(false);
        };
        if !agent.admin_state_up {
            debug!(%host, agent_id = %agent.id, "l3 agent is administratively down");
            return Ok(false);
        }
        if agent.reserved {
            debug!(%host, agent_id = %agent.id, "l3 agent is reserved");
            return Ok(true);
        }

        let routers = match router_ids {
            Some(ids) => {
                let mut routers = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(router) = self.backend.get_router(id)? {
                        routers.push(router);
                    }
                }
                routers
            }
            None => self.backend.list_routers()?,
        };

        for router in routers {
            let hosts = self.bound_agent_ids(&router.id)?;
            let needs_agent = if router.distributed {
                !hosts.contains(&agent.id)
            } else {
                hosts.is_empty()
            };
            if !needs_agent {
                continue;
            }
            if let Some(reason) = self.filter.rejection(&router, &agent, None)? {
                debug!(router_id = %router.id, agent_id = %agent.id, %reason, "skipped on sync");
                continue;
            }
            if router.distributed {
                self.bindings.bind_router(&router.id, &agent)?;
            } else {
                self.bindings.bind_router_exclusive(&router.id, &agent)?;
            }
        }
        Ok(true)
    }

    pub fn list_l3_agents_hosting_router(&self, router_id: &str) -> SchedulerResult<Vec<Agent>> {
        self.router(router_id)?;
        Ok(self
            .bindings
            .get_routers_hosting(router_id)?
            .into_iter()
            .map(|(_, agent)| agent)
            .collect())
    }

    /// Agents out of `agents` that can host `router`.
    pub fn get_l3_agent_candidates(
        &self,
        router: &Router,
        agents: &[Agent],
        subnet_id: Option<&str>,
    ) -> SchedulerResult<Vec<Agent>> {
        self.filter.candidates(router, agents, subnet_id)
    }

    /// Agent hosting the SNAT part of a distributed router.
    pub fn snat_agent_hosting_router(&self, router_id: &str) -> SchedulerResult<Option<Agent>> {
        match self.bindings.snat_binding(router_id)? {
            Some(agent_id) => Ok(self.registry.get_l3_agent(&agent_id)?),
            None => Ok(None),
        }
    }

    /// Bindings held by admin-up agents silent since before `cutoff`.
    pub fn bindings_on_dead_agents(&self, cutoff: u64) -> SchedulerResult<Vec<RouterAgentBinding>> {
        Ok(self.state.list_bindings_on_dead_agents(cutoff)?)
    }

    // ── Manual administration ───────────────────────────────────────

    /// Administrator binds `router_id` to `agent_id`.
    ///
    /// Liveness is not checked. An administratively down agent is refused
    /// unless `allow_router_schedule_down_agent` is set.
    pub fn add_router_to_l3_agent(&self, agent_id: &str, router_id: &str) -> SchedulerResult<()> {
        let agent = self.agent(agent_id)?;
        let router = self.router(router_id)?;

        if !agent.admin_state_up && !self.config.allow_router_schedule_down_agent {
            return Err(bad_configuration(router_id, agent_id, &Rejection::AdminDown));
        }
        if let Some(reason) = self.filter.structural_rejection(&router, &agent, None)? {
            return Err(bad_configuration(router_id, agent_id, &reason));
        }

        let outcome = if router.distributed {
            self.bindings.bind_router(router_id, &agent)?
        } else {
            self.bindings.bind_router_exclusive(router_id, &agent)?
        };
        match outcome {
            BindOutcome::Created | BindOutcome::AlreadyBound => Ok(()),
            BindOutcome::AlreadyHosted { agent_id: holder } => Err(SchedulerError::Conflict {
                router_id: router_id.to_string(),
                agent_id: holder,
            }),
            BindOutcome::RouterGone => Err(SchedulerError::RouterNotFound(router_id.to_string())),
            BindOutcome::AgentGone => Err(SchedulerError::AgentNotFound(agent_id.to_string())),
        }
    }

    /// Administrator removes `router_id` from `agent_id`, including the SNAT
    /// role if the agent held it.
    pub fn remove_router_from_l3_agent(&self, agent_id: &str, router_id: &str) -> SchedulerResult<()> {
        self.agent(agent_id)?;
        self.bindings.unbind_router(router_id, agent_id)?;
        if self.bindings.snat_binding(router_id)?.as_deref() == Some(agent_id) {
            self.bindings.unbind_snat(router_id)?;
        }
        Ok(())
    }

    pub fn list_routers_on_l3_agent(&self, agent_id: &str) -> SchedulerResult<Vec<Router>> {
        self.agent(agent_id)?;
        let mut routers = Vec::new();
        for binding in self.state.list_agent_bindings(agent_id)? {
            if let Some(router) = self.backend.get_router(&binding.router_id)? {
                routers.push(router);
            }
        }
        Ok(routers)
    }

    /// Admin-up routers the admin-up agent on `host` should be running.
    pub fn list_active_routers_on_agent_host(&self, host: &str) -> SchedulerResult<Vec<Router>> {
        let Some(agent) = self.registry.get_l3_agent_by_host(host)? else {
            return Ok(Vec::new());
        };
        if !agent.admin_state_up {
            return Ok(Vec::new());
        }
        Ok(self
            .list_routers_on_l3_agent(&agent.id)?
            .into_iter()
            .filter(|r| r.admin_state_up)
            .collect())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn router(&self, router_id: &str) -> SchedulerResult<Router> {
        self.backend
            .get_router(router_id)?
            .ok_or_else(|| SchedulerError::RouterNotFound(router_id.to_string()))
    }

    fn agent(&self, agent_id: &str) -> SchedulerResult<Agent> {
        self.registry
            .get_l3_agent(agent_id)?
            .ok_or_else(|| SchedulerError::AgentNotFound(agent_id.to_string()))
    }

    fn bound_agent_ids(&self, router_id: &str) -> SchedulerResult<Vec<AgentId>> {
        Ok(self
            .state
            .list_router_bindings(router_id)?
            .into_iter()
            .map(|b| b.agent_id)
            .collect())
    }

    /// Live, admin-up agents that pass the candidate filter.
    fn eligible_agents(&self, router: &Router, subnet_id: Option<&str>) -> SchedulerResult<Vec<Agent>> {
        let agents = self
            .registry
            .get_l3_agents(Some(true), &AgentFilters::default(), false)?;
        self.filter.candidates(router, &agents, subnet_id)
    }
}

fn bad_configuration(router_id: &str, agent_id: &str, reason: &Rejection) -> SchedulerError {
    SchedulerError::BadConfiguration {
        router_id: router_id.to_string(),
        agent_id: agent_id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn scheduler(state: &StateStore) -> RouterScheduler {
        RouterScheduler::new(SchedulerConfig::default(), state.clone())
    }

    fn put_agents(state: &StateStore, agents: &[Agent]) {
        for a in agents {
            state.put_agent(a).unwrap();
        }
    }

    fn sorted(mut ids: Vec<AgentId>) -> Vec<AgentId> {
        ids.sort();
        ids
    }

    #[test]
    fn unknown_router_is_not_found() {
        let state = store();
        let err = scheduler(&state).schedule_router("nope", None, None).unwrap_err();
        assert!(matches!(err, SchedulerError::RouterNotFound(_)));
    }

    #[test]
    fn centralized_router_gets_one_agent() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy"), agent("a2", "h2", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        let s = scheduler(&state);

        let outcome = s.schedule_router("r1", None, None).unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Scheduled(ref a) if a.len() == 1));
        assert_eq!(state.list_router_bindings("r1").unwrap().len(), 1);

        let again = s.schedule_router("r1", None, None).unwrap();
        assert_eq!(again, ScheduleOutcome::AlreadyScheduled(outcome.agents().to_vec()));
    }

    #[test]
    fn no_candidates_is_not_an_error() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "dvr")]);
        state.put_router(&router("r1", false, None)).unwrap();

        let outcome = scheduler(&state).schedule_router("r1", None, None).unwrap();
        assert_eq!(outcome, ScheduleOutcome::NoAssignment);
        assert!(!outcome.is_assigned());
    }

    #[test]
    fn reserved_agents_get_no_new_routers() {
        let state = store();
        let mut reserved = agent("a1", "h1", "legacy");
        reserved.reserved = true;
        put_agents(&state, &[reserved.clone(), agent("a2", "h2", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        let s = scheduler(&state);

        let outcome = s.schedule_router("r1", Some(vec![reserved.clone()]), None).unwrap();
        assert_eq!(outcome, ScheduleOutcome::NoAssignment);

        let outcome = s.schedule_router("r1", None, None).unwrap();
        assert_eq!(outcome, ScheduleOutcome::Scheduled(vec!["a2".to_string()]));
    }

    #[test]
    fn distributed_router_fans_out_and_is_idempotent() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "dvr"), agent("a2", "h2", "dvr")]);
        state.put_router(&router("r1", true, None)).unwrap();
        let s = scheduler(&state);

        let first = s.schedule_router("r1", None, None).unwrap();
        assert_eq!(
            sorted(first.agents().to_vec()),
            vec!["a1".to_string(), "a2".to_string()]
        );

        let second = s.schedule_router("r1", None, None).unwrap();
        assert!(matches!(second, ScheduleOutcome::AlreadyScheduled(_)));
        assert_eq!(sorted(second.agents().to_vec()), sorted(first.agents().to_vec()));
    }

    #[test]
    fn distributed_router_with_gateway_gets_snat_agent() {
        let state = store();
        put_agents(
            &state,
            &[agent("c1", "h1", "dvr"), agent("n1", "net1", "dvr_snat")],
        );
        state.put_router(&router("r1", true, Some("ext"))).unwrap();
        let s = scheduler(&state);

        s.schedule_router("r1", None, None).unwrap();
        let snat = s.snat_agent_hosting_router("r1").unwrap().unwrap();
        assert_eq!(snat.id, "n1");

        // Gateway removed: the SNAT role is released on the next pass.
        state.put_router(&router("r1", true, None)).unwrap();
        s.schedule_router("r1", None, None).unwrap();
        assert!(s.snat_agent_hosting_router("r1").unwrap().is_none());
    }

    #[test]
    fn gateway_removal_releases_snat_without_candidates() {
        let state = store();
        put_agents(&state, &[agent("n1", "net1", "dvr_snat")]);
        state.put_router(&router("r1", true, Some("ext"))).unwrap();
        let s = scheduler(&state);
        s.schedule_router("r1", None, None).unwrap();
        assert!(s.snat_agent_hosting_router("r1").unwrap().is_some());

        let mut draining = agent("n1", "net1", "dvr_snat");
        draining.reserved = true;
        put_agents(&state, &[draining]);
        state.put_router(&router("r1", true, None)).unwrap();

        assert_eq!(s.schedule_router("r1", None, None).unwrap(), ScheduleOutcome::NoAssignment);
        assert!(s.snat_agent_hosting_router("r1").unwrap().is_none());
        assert_eq!(state.list_router_bindings("r1").unwrap().len(), 1);
    }

    #[test]
    fn auto_schedule_adds_dvr_agent_to_hosted_distributed_router() {
        let state = store();
        put_agents(
            &state,
            &[
                agent("a1", "h1", "dvr"),
                agent("a2", "h2", "dvr"),
                agent("l1", "h3", "legacy"),
            ],
        );
        state.put_router(&router("r1", true, None)).unwrap();
        state.insert_binding("r1", "a1").unwrap();
        let s = scheduler(&state);

        assert!(s.auto_schedule_routers("h2", None).unwrap());
        assert!(s.auto_schedule_routers("h3", None).unwrap());
        assert_eq!(
            sorted(s.bound_agent_ids("r1").unwrap()),
            vec!["a1".to_string(), "a2".to_string()]
        );

        // Syncing again changes nothing.
        assert!(s.auto_schedule_routers("h2", None).unwrap());
        assert_eq!(state.list_router_bindings("r1").unwrap().len(), 2);
    }

    #[test]
    fn reschedule_distributed_router_refans_and_repicks_snat() {
        let state = store();
        put_agents(
            &state,
            &[
                agent("a1", "h1", "dvr"),
                agent("a2", "h2", "dvr"),
                agent("n1", "net1", "dvr_snat"),
            ],
        );
        state.put_router(&router("r1", true, Some("ext"))).unwrap();
        let s = scheduler(&state);
        s.schedule_router("r1", None, None).unwrap();
        assert_eq!(s.snat_agent_hosting_router("r1").unwrap().unwrap().id, "n1");

        let mut retired = agent("a1", "h1", "dvr");
        retired.admin_state_up = false;
        let mut old_snat = agent("n1", "net1", "dvr_snat");
        old_snat.admin_state_up = false;
        put_agents(&state, &[retired, old_snat, agent("n2", "net2", "dvr_snat")]);

        let moved = sorted(s.reschedule_router("r1").unwrap());
        assert_eq!(moved, vec!["a2".to_string(), "n2".to_string()]);
        assert_eq!(sorted(s.bound_agent_ids("r1").unwrap()), moved);
        assert_eq!(s.snat_agent_hosting_router("r1").unwrap().unwrap().id, "n2");
    }

    #[test]
    fn gw_hint_requests_snat_agent() {
        let state = store();
        put_agents(&state, &[agent("n1", "net1", "dvr_snat")]);
        state.put_router(&router("r1", true, None)).unwrap();
        let hints = SchedulingHints {
            subnet_id: None,
            gw_exists: true,
        };

        scheduler(&state).schedule_router("r1", None, Some(&hints)).unwrap();
        assert_eq!(
            state.get_snat_binding("r1").unwrap().map(|b| b.agent_id).as_deref(),
            Some("n1")
        );
    }

    #[test]
    fn reschedule_moves_router_and_clears_snat() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        let s = scheduler(&state);
        s.schedule_router("r1", None, None).unwrap();

        let mut retired = agent("a1", "h1", "legacy");
        retired.admin_state_up = false;
        put_agents(&state, &[retired, agent("a2", "h2", "legacy")]);

        assert_eq!(s.reschedule_router("r1").unwrap(), vec!["a2".to_string()]);
        let hosts = s.list_l3_agents_hosting_router("r1").unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, "a2");
    }

    #[test]
    fn reschedule_without_candidates_fails_hard() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        let s = scheduler(&state);
        s.schedule_router("r1", None, None).unwrap();

        let mut retired = agent("a1", "h1", "legacy");
        retired.admin_state_up = false;
        put_agents(&state, &[retired]);

        let err = s.reschedule_router("r1").unwrap_err();
        assert!(matches!(err, SchedulerError::ReschedulingFailed(_)));
        assert!(s.list_l3_agents_hosting_router("r1").unwrap().is_empty());
    }

    #[test]
    fn auto_schedule_binds_unhosted_routers_on_sync() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy"), agent("a2", "h2", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        state.put_router(&router("r2", false, None)).unwrap();
        state.insert_binding("r2", "a2").unwrap();
        let s = scheduler(&state);

        assert!(s.auto_schedule_routers("h1", None).unwrap());
        let on_a1: Vec<String> = s
            .list_routers_on_l3_agent("a1")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(on_a1, vec!["r1"]);
    }

    #[test]
    fn auto_schedule_respects_router_ids_and_switches() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        state.put_router(&router("r2", false, None)).unwrap();

        let s = scheduler(&state);
        assert!(s.auto_schedule_routers("h1", Some(&["r2".to_string()][..])).unwrap());
        assert!(state.list_router_bindings("r1").unwrap().is_empty());
        assert_eq!(state.list_router_bindings("r2").unwrap().len(), 1);

        assert!(!s.auto_schedule_routers("unknown-host", None).unwrap());

        let off = RouterScheduler::new(
            SchedulerConfig {
                router_auto_schedule: false,
                ..Default::default()
            },
            state.clone(),
        );
        assert!(!off.auto_schedule_routers("h1", None).unwrap());
        assert!(state.list_router_bindings("r1").unwrap().is_empty());
    }

    #[test]
    fn manual_add_checks_agent_and_router() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy"), agent("dvr", "h2", "dvr")]);
        state.put_router(&router("r1", false, None)).unwrap();
        let s = scheduler(&state);

        assert!(matches!(
            s.add_router_to_l3_agent("missing", "r1").unwrap_err(),
            SchedulerError::AgentNotFound(_)
        ));
        assert!(matches!(
            s.add_router_to_l3_agent("a1", "missing").unwrap_err(),
            SchedulerError::RouterNotFound(_)
        ));
        assert!(matches!(
            s.add_router_to_l3_agent("dvr", "r1").unwrap_err(),
            SchedulerError::BadConfiguration { .. }
        ));
    }

    #[test]
    fn manual_add_conflicts_with_other_host() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "legacy"), agent("a2", "h2", "legacy")]);
        state.put_router(&router("r1", false, None)).unwrap();
        let s = scheduler(&state);

        s.add_router_to_l3_agent("a1", "r1").unwrap();
        s.add_router_to_l3_agent("a1", "r1").unwrap();
        let err = s.add_router_to_l3_agent("a2", "r1").unwrap_err();
        match err {
            SchedulerError::Conflict { agent_id, .. } => assert_eq!(agent_id, "a1"),
            other => panic!("expected conflict, got {other}"),
        }
    }

    #[test]
    fn manual_add_to_admin_down_agent_needs_opt_in() {
        let state = store();
        let mut down = agent("a1", "h1", "legacy");
        down.admin_state_up = false;
        put_agents(&state, &[down]);
        state.put_router(&router("r1", false, None)).unwrap();

        let strict = scheduler(&state);
        assert!(matches!(
            strict.add_router_to_l3_agent("a1", "r1").unwrap_err(),
            SchedulerError::BadConfiguration { .. }
        ));

        let permissive = RouterScheduler::new(
            SchedulerConfig {
                allow_router_schedule_down_agent: true,
                ..Default::default()
            },
            state.clone(),
        );
        permissive.add_router_to_l3_agent("a1", "r1").unwrap();
        assert_eq!(state.list_router_bindings("r1").unwrap().len(), 1);
    }

    #[test]
    fn manual_remove_and_listing() {
        let state = store();
        put_agents(&state, &[agent("a1", "h1", "dvr_snat")]);
        state.put_router(&router("r1", true, Some("ext"))).unwrap();
        let mut disabled = router("r2", false, None);
        disabled.admin_state_up = false;
        state.put_router(&disabled).unwrap();
        let s = scheduler(&state);

        s.schedule_router("r1", None, None).unwrap();
        s.add_router_to_l3_agent("a1", "r2").unwrap();
        assert_eq!(s.list_routers_on_l3_agent("a1").unwrap().len(), 2);

        let active: Vec<String> = s
            .list_active_routers_on_agent_host("h1")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(active, vec!["r1"]);

        s.remove_router_from_l3_agent("a1", "r1").unwrap();
        assert!(s.snat_agent_hosting_router("r1").unwrap().is_none());
        assert!(matches!(
            s.remove_router_from_l3_agent("a1", "r1").unwrap_err(),
            SchedulerError::BindingNotFound { .. }
        ));
    }

    #[test]
    fn schedule_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ScheduleOutcome::Scheduled(vec!["a1".to_string()])).unwrap();
        assert_eq!(json["status"], "scheduled");
        assert_eq!(json["agents"][0], "a1");

        let json = serde_json::to_value(ScheduleOutcome::NoAssignment).unwrap();
        assert_eq!(json["status"], "no_assignment");
    }
}
