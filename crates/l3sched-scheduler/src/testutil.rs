//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;

use l3sched_core::SchedulerConfig;
use l3sched_state::*;

use crate::registry::{StoreRegistry, epoch_secs};

pub(crate) fn store() -> StateStore {
    StateStore::open_in_memory().unwrap()
}

pub(crate) fn registry(state: &StateStore) -> Arc<StoreRegistry> {
    Arc::new(StoreRegistry::new(state.clone(), &SchedulerConfig::default()))
}

/// Admin-up agent with a fresh heartbeat.
pub(crate) fn agent(id: &str, host: &str, mode: &str) -> Agent {
    Agent {
        id: id.to_string(),
        host: host.to_string(),
        admin_state_up: true,
        heartbeat_timestamp: epoch_secs(),
        reserved: false,
        configuration: AgentConfiguration {
            agent_mode: Some(mode.to_string()),
            ..Default::default()
        },
    }
}

pub(crate) fn router(id: &str, distributed: bool, gateway: Option<&str>) -> Router {
    Router {
        id: id.to_string(),
        name: format!("router-{id}"),
        admin_state_up: true,
        distributed,
        external_gateway_info: gateway.map(|network_id| ExternalGatewayInfo {
            network_id: network_id.to_string(),
        }),
    }
}

pub(crate) fn compute_port(id: &str, host: &str, subnet_id: &str) -> Port {
    Port {
        id: id.to_string(),
        network_id: "net-1".to_string(),
        device_owner: "compute:nova".to_string(),
        device_id: format!("vm-{id}"),
        binding_host: host.to_string(),
        fixed_ips: vec![FixedIp {
            subnet_id: subnet_id.to_string(),
            ip_address: "10.0.0.5".to_string(),
        }],
    }
}
