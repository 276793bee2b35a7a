//! Candidate filtering: which agents may structurally host a router.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use l3sched_state::*;

use crate::error::SchedulerResult;
use crate::registry::{AgentRegistry, RouterBackend};

/// Why an agent cannot host a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    AdminDown,
    /// The agent runs without namespaces and serves one fixed router.
    PinnedToOtherRouter { pinned: Option<String> },
    /// The router has no gateway and the agent refuses internal-only routers.
    InternalOnlyRefused,
    ExternalNetworkMismatch { agent_network: String, router_network: String },
    /// The agent mode cannot host this router topology.
    ModeMismatch { mode: String },
    /// No DVR-serviced port on the subnet is bound to the agent's host.
    NoLocalPorts { subnet_id: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdminDown => f.write_str("agent is administratively down"),
            Self::PinnedToOtherRouter { pinned: Some(id) } => {
                write!(f, "agent runs without namespaces and is pinned to router {id}")
            }
            Self::PinnedToOtherRouter { pinned: None } => {
                f.write_str("agent runs without namespaces and has no router configured")
            }
            Self::InternalOnlyRefused => {
                f.write_str("agent does not handle routers without an external gateway")
            }
            Self::ExternalNetworkMismatch {
                agent_network,
                router_network,
            } => write!(
                f,
                "agent serves external network {agent_network}, router uses {router_network}"
            ),
            Self::ModeMismatch { mode } => {
                write!(f, "agent mode {mode} cannot host this router type")
            }
            Self::NoLocalPorts { subnet_id } => {
                write!(f, "no serviced port on subnet {subnet_id} is bound to the agent host")
            }
        }
    }
}

/// Computes eligible agents for a router.
#[derive(Clone)]
pub struct CandidateFilter {
    registry: Arc<dyn AgentRegistry>,
    backend: Arc<dyn RouterBackend>,
}

impl CandidateFilter {
    pub fn new(registry: Arc<dyn AgentRegistry>, backend: Arc<dyn RouterBackend>) -> Self {
        Self { registry, backend }
    }

    /// Agents from `agents` that can host `router`, in input order.
    ///
    /// Locality of distributed routers is checked only when `subnet_id`
    /// is given.
    pub fn candidates(
        &self,
        router: &Router,
        agents: &[Agent],
        subnet_id: Option<&str>,
    ) -> SchedulerResult<Vec<Agent>> {
        let mut eligible = Vec::new();
        for agent in agents {
            match self.rejection(router, agent, subnet_id)? {
                None => eligible.push(agent.clone()),
                Some(reason) => {
                    debug!(router_id = %router.id, agent_id = %agent.id, %reason, "agent rejected");
                }
            }
        }
        Ok(eligible)
    }

    /// Agents from `agents` that can host the centralized SNAT part of a
    /// distributed router.
    pub fn snat_candidates(&self, router: &Router, agents: &[Agent]) -> Vec<Agent> {
        agents
            .iter()
            .filter(|agent| match self.snat_rejection(router, agent) {
                None => true,
                Some(reason) => {
                    debug!(router_id = %router.id, agent_id = %agent.id, %reason, "snat agent rejected");
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// First reason `agent` cannot host `router`, or `None` if it can.
    pub fn rejection(
        &self,
        router: &Router,
        agent: &Agent,
        subnet_id: Option<&str>,
    ) -> SchedulerResult<Option<Rejection>> {
        if !agent.admin_state_up {
            return Ok(Some(Rejection::AdminDown));
        }
        self.structural_rejection(router, agent, subnet_id)
    }

    /// Like [`rejection`](Self::rejection) but ignoring administrative state.
    pub fn structural_rejection(
        &self,
        router: &Router,
        agent: &Agent,
        subnet_id: Option<&str>,
    ) -> SchedulerResult<Option<Rejection>> {
        let conf = self.registry.get_configuration_dict(agent);
        if let Some(reason) = gateway_rejection(router, &conf) {
            return Ok(Some(reason));
        }

        let mode = conf.agent_mode();
        if !router.distributed {
            if mode.hosts_centralized() {
                return Ok(None);
            }
            return Ok(Some(Rejection::ModeMismatch {
                mode: mode.as_str().to_string(),
            }));
        }

        if !mode.is_distributed() {
            return Ok(Some(Rejection::ModeMismatch {
                mode: mode.as_str().to_string(),
            }));
        }
        match subnet_id {
            Some(subnet_id) if !self.has_local_ports(&agent.host, subnet_id)? => {
                Ok(Some(Rejection::NoLocalPorts {
                    subnet_id: subnet_id.to_string(),
                }))
            }
            _ => Ok(None),
        }
    }

    fn snat_rejection(&self, router: &Router, agent: &Agent) -> Option<Rejection> {
        if !agent.admin_state_up {
            return Some(Rejection::AdminDown);
        }
        let conf = self.registry.get_configuration_dict(agent);
        if let Some(reason) = gateway_rejection(router, &conf) {
            return Some(reason);
        }
        let mode = conf.agent_mode();
        (mode != AgentMode::DvrSnat).then(|| Rejection::ModeMismatch {
            mode: mode.as_str().to_string(),
        })
    }

    fn has_local_ports(&self, host: &str, subnet_id: &str) -> SchedulerResult<bool> {
        let filter = PortFilter {
            binding_host: Some(host.to_string()),
            subnet_id: Some(subnet_id.to_string()),
        };
        let ports = self.backend.get_ports(&filter)?;
        Ok(ports.iter().any(Port::is_dvr_serviced))
    }
}

/// Namespace pinning and external network checks.
fn gateway_rejection(router: &Router, conf: &AgentConfiguration) -> Option<Rejection> {
    if !conf.use_namespaces() {
        let pinned = conf.pinned_router_id();
        if pinned != Some(router.id.as_str()) {
            return Some(Rejection::PinnedToOtherRouter {
                pinned: pinned.map(str::to_string),
            });
        }
    }

    match (router.external_network_id(), conf.gateway_external_network_id()) {
        (None, _) if !conf.handle_internal_only_routers() => Some(Rejection::InternalOnlyRefused),
        (Some(router_net), Some(agent_net)) if router_net != agent_net => {
            Some(Rejection::ExternalNetworkMismatch {
                agent_network: agent_net.to_string(),
                router_network: router_net.to_string(),
            })
        }
        _ => None,
    }
}
