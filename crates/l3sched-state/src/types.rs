//! Domain types for the scheduler state store.
//!
//! Agents, routers, and ports are owned by external collaborators (the agent
//! registry and the router/port backend); the scheduler reads them. Bindings
//! are owned by the scheduler. All types are serializable to/from JSON for
//! storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for an L3 agent.
pub type AgentId = String;

/// Unique identifier for a logical router.
pub type RouterId = String;

/// Unique identifier for a port.
pub type PortId = String;

// ── Agent ─────────────────────────────────────────────────────────

/// Operating mode an L3 agent reports in its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgentMode {
    /// Hosts centralized routers only.
    #[default]
    Legacy,
    /// Compute-node agent serving distributed routers locally.
    Dvr,
    /// Network-node agent serving distributed routers plus centralized SNAT.
    DvrSnat,
    /// Any other reported mode, kept verbatim.
    Other(String),
}

impl AgentMode {
    pub fn parse(mode: &str) -> Self {
        match mode {
            "legacy" => Self::Legacy,
            "dvr" => Self::Dvr,
            "dvr_snat" => Self::DvrSnat,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Legacy => "legacy",
            Self::Dvr => "dvr",
            Self::DvrSnat => "dvr_snat",
            Self::Other(s) => s,
        }
    }

    /// Whether the agent can host the distributed part of a DVR router.
    ///
    /// Every mode whose name starts with `dvr` qualifies.
    pub fn is_distributed(&self) -> bool {
        self.as_str().starts_with("dvr")
    }

    /// Whether the agent can host a centralized (non-distributed) router.
    pub fn hosts_centralized(&self) -> bool {
        matches!(self, Self::Legacy | Self::DvrSnat)
    }
}

/// Configuration map an agent reports with its heartbeat.
///
/// Every field is optional as reported; use the accessor methods to read
/// the value with the scheduler's defaults applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AgentConfiguration {
    pub agent_mode: Option<String>,
    /// Router this agent is pinned to when it runs without namespaces.
    pub router_id: Option<RouterId>,
    pub use_namespaces: Option<bool>,
    pub handle_internal_only_routers: Option<bool>,
    pub gateway_external_network_id: Option<String>,
    pub external_network_bridge: Option<String>,
    pub device_drivers: Vec<String>,
}

impl AgentConfiguration {
    /// Reported mode, `legacy` when absent.
    pub fn agent_mode(&self) -> AgentMode {
        self.agent_mode
            .as_deref()
            .map(AgentMode::parse)
            .unwrap_or_default()
    }

    /// `true` when absent.
    pub fn use_namespaces(&self) -> bool {
        self.use_namespaces.unwrap_or(true)
    }

    /// `true` when absent.
    pub fn handle_internal_only_routers(&self) -> bool {
        self.handle_internal_only_routers.unwrap_or(true)
    }

    /// External network the agent is restricted to, if any. Empty strings
    /// count as unset.
    pub fn gateway_external_network_id(&self) -> Option<&str> {
        self.gateway_external_network_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Router the agent is pinned to, if any. Empty strings count as unset.
    pub fn pinned_router_id(&self) -> Option<&str> {
        self.router_id.as_deref().filter(|id| !id.is_empty())
    }

    /// A copy with every defaulted field filled in.
    pub fn with_defaults(&self) -> Self {
        Self {
            agent_mode: Some(self.agent_mode().as_str().to_string()),
            router_id: self.router_id.clone(),
            use_namespaces: Some(self.use_namespaces()),
            handle_internal_only_routers: Some(self.handle_internal_only_routers()),
            gateway_external_network_id: self.gateway_external_network_id.clone(),
            external_network_bridge: self.external_network_bridge.clone(),
            device_drivers: self.device_drivers.clone(),
        }
    }
}

/// An L3 agent as known to the agent registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub host: String,
    pub admin_state_up: bool,
    /// Unix timestamp (seconds) of the last heartbeat.
    pub heartbeat_timestamp: u64,
    /// Draining: keeps existing routers but receives no new ones.
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub configuration: AgentConfiguration,
}

impl Agent {
    pub fn mode(&self) -> AgentMode {
        self.configuration.agent_mode()
    }
}

// ── Router ────────────────────────────────────────────────────────

/// External gateway of a router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalGatewayInfo {
    pub network_id: String,
}

/// A logical router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Router {
    pub id: RouterId,
    #[serde(default)]
    pub name: String,
    pub admin_state_up: bool,
    /// Distributed (DVR) routers are replicated on every compute host
    /// with local workload; centralized routers live on one agent.
    pub distributed: bool,
    pub external_gateway_info: Option<ExternalGatewayInfo>,
}

impl Router {
    /// External network id, if the router has a gateway.
    pub fn external_network_id(&self) -> Option<&str> {
        self.external_gateway_info
            .as_ref()
            .map(|gw| gw.network_id.as_str())
    }
}

// ── Port ──────────────────────────────────────────────────────────

/// A fixed IP allocation of a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: String,
}

/// A port as seen by the locality check for distributed routers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Port {
    pub id: PortId,
    pub network_id: String,
    /// Owning device kind, e.g. `compute:nova` or `network:dhcp`.
    pub device_owner: String,
    pub device_id: String,
    /// Host the port is bound to; empty when unbound.
    #[serde(default)]
    pub binding_host: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
}

impl Port {
    /// Ports whose traffic is routed by a distributed router on their host.
    pub fn is_dvr_serviced(&self) -> bool {
        self.device_owner.starts_with("compute:")
            || matches!(
                self.device_owner.as_str(),
                "network:dhcp" | "neutron:LOADBALANCER" | "neutron:LOADBALANCERV2"
            )
    }

    pub fn on_subnet(&self, subnet_id: &str) -> bool {
        self.fixed_ips.iter().any(|ip| ip.subnet_id == subnet_id)
    }
}

/// Filter for port queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortFilter {
    pub binding_host: Option<String>,
    pub subnet_id: Option<String>,
}

impl PortFilter {
    pub fn matches(&self, port: &Port) -> bool {
        self.binding_host
            .as_deref()
            .is_none_or(|host| port.binding_host == host)
            && self
                .subnet_id
                .as_deref()
                .is_none_or(|subnet| port.on_subnet(subnet))
    }
}

// ── Bindings ──────────────────────────────────────────────────────

/// Durable record that an agent hosts a router. Never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterAgentBinding {
    pub router_id: RouterId,
    pub agent_id: AgentId,
}

impl RouterAgentBinding {
    pub fn new(router_id: &str, agent_id: &str) -> Self {
        Self {
            router_id: router_id.to_string(),
            agent_id: agent_id.to_string(),
        }
    }

    /// Build the composite key for the bindings table.
    pub fn table_key(&self) -> String {
        binding_key(&self.router_id, &self.agent_id)
    }
}

/// Composite key `{router_id}:{agent_id}`.
pub fn binding_key(router_id: &str, agent_id: &str) -> String {
    format!("{router_id}:{agent_id}")
}

/// Prefix shared by every binding key of one router.
pub fn router_binding_prefix(router_id: &str) -> String {
    format!("{router_id}:")
}

/// Result of a binding insert. Only `Created` changed the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Created,
    /// The exact (router, agent) pair already exists.
    AlreadyBound,
    /// An exclusive bind found the router hosted by this agent.
    AlreadyHosted { agent_id: AgentId },
    /// The router no longer exists.
    RouterGone,
    /// The agent no longer exists.
    AgentGone,
}

impl BindOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}
