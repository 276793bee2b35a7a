//! Failover sweeps against an in-memory store.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use l3sched_core::SchedulerConfig;
use l3sched_health::FailoverMonitor;
use l3sched_scheduler::RouterScheduler;
use l3sched_state::*;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn legacy_agent(id: &str, host: &str, heartbeat: u64) -> Agent {
    Agent {
        id: id.to_string(),
        host: host.to_string(),
        admin_state_up: true,
        heartbeat_timestamp: heartbeat,
        reserved: false,
        configuration: AgentConfiguration::default(),
    }
}

fn central_router(id: &str, gateway: Option<&str>) -> Router {
    Router {
        id: id.to_string(),
        name: id.to_string(),
        admin_state_up: true,
        distributed: false,
        external_gateway_info: gateway.map(|network_id| ExternalGatewayInfo {
            network_id: network_id.to_string(),
        }),
    }
}

fn failover_monitor(store: &StateStore) -> (Arc<RouterScheduler>, FailoverMonitor) {
    let config = SchedulerConfig {
        allow_automatic_l3agent_failover: true,
        agent_down_time: 75,
        ..Default::default()
    };
    let scheduler = Arc::new(RouterScheduler::new(config, store.clone()));
    let monitor = FailoverMonitor::new(scheduler.clone());
    (scheduler, monitor)
}

#[tokio::test(start_paused = true)]
async fn router_moves_off_agent_past_dead_limit() {
    let store = StateStore::open_in_memory().unwrap();
    let t = now();
    store.put_agent(&legacy_agent("a1", "h1", t - 151)).unwrap();
    store.put_agent(&legacy_agent("a2", "h2", t)).unwrap();
    store.put_router(&central_router("r1", None)).unwrap();
    store.insert_binding("r1", "a1").unwrap();

    let (scheduler, mut monitor) = failover_monitor(&store);
    let report = monitor.check_at(t).await.unwrap();

    assert_eq!(report.dead_agents, vec!["a1".to_string()]);
    assert_eq!(report.rescheduled, vec!["r1".to_string()]);
    assert!(report.failed.is_empty());

    let hosts: Vec<String> = scheduler
        .list_l3_agents_hosting_router("r1")
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(hosts, vec!["a2"]);
    assert!(store.list_agent_bindings("a1").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn agent_merely_down_is_not_failed_over() {
    let store = StateStore::open_in_memory().unwrap();
    let t = now();
    // Down (older than agent_down_time) but not yet dead.
    store.put_agent(&legacy_agent("a1", "h1", t - 100)).unwrap();
    store.put_agent(&legacy_agent("a2", "h2", t)).unwrap();
    store.put_router(&central_router("r1", None)).unwrap();
    store.insert_binding("r1", "a1").unwrap();

    let (_, mut monitor) = failover_monitor(&store);
    let report = monitor.check_at(t).await.unwrap();

    assert!(report.rescheduled.is_empty());
    assert_eq!(store.list_router_bindings("r1").unwrap()[0].agent_id, "a1");
}

#[tokio::test(start_paused = true)]
async fn one_failing_router_does_not_block_the_sweep() {
    let store = StateStore::open_in_memory().unwrap();
    let t = now();
    let mut restricted = legacy_agent("a2", "h2", t);
    restricted.configuration.gateway_external_network_id = Some("ext-a".to_string());
    store.put_agent(&legacy_agent("a1", "h1", t - 1_000)).unwrap();
    store.put_agent(&restricted).unwrap();
    // r1 fits a2; r2 needs ext-b, which no live agent serves.
    store.put_router(&central_router("r1", Some("ext-a"))).unwrap();
    store.put_router(&central_router("r2", Some("ext-b"))).unwrap();
    store.insert_binding("r1", "a1").unwrap();
    store.insert_binding("r2", "a1").unwrap();

    let (_, mut monitor) = failover_monitor(&store);
    let report = monitor.check_at(t).await.unwrap();

    assert_eq!(report.rescheduled, vec!["r1".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "r2");
    assert_eq!(store.list_router_bindings("r1").unwrap()[0].agent_id, "a2");
    assert!(store.list_router_bindings("r2").unwrap().is_empty());
}

fn dvr_agent(id: &str, host: &str, mode: &str, heartbeat: u64) -> Agent {
    let mut agent = legacy_agent(id, host, heartbeat);
    agent.configuration.agent_mode = Some(mode.to_string());
    agent
}

#[tokio::test(start_paused = true)]
async fn distributed_router_drops_dead_fan_out_host() {
    let store = StateStore::open_in_memory().unwrap();
    let t = now();
    store.put_agent(&dvr_agent("a1", "h1", "dvr", t - 151)).unwrap();
    store.put_agent(&dvr_agent("a2", "h2", "dvr", t)).unwrap();
    store.put_agent(&dvr_agent("n1", "net1", "dvr_snat", t - 151)).unwrap();
    store.put_agent(&dvr_agent("n2", "net2", "dvr_snat", t)).unwrap();
    let mut router = central_router("r1", Some("ext"));
    router.distributed = true;
    store.put_router(&router).unwrap();
    for agent_id in ["a1", "a2", "n1"] {
        store.insert_binding("r1", agent_id).unwrap();
    }
    store.insert_snat_binding("r1", "n1").unwrap();

    let (scheduler, mut monitor) = failover_monitor(&store);
    let report = monitor.check_at(t).await.unwrap();

    assert_eq!(report.dead_agents, vec!["a1".to_string(), "n1".to_string()]);
    assert_eq!(report.rescheduled, vec!["r1".to_string()]);

    let mut hosts: Vec<String> = store
        .list_router_bindings("r1")
        .unwrap()
        .into_iter()
        .map(|b| b.agent_id)
        .collect();
    hosts.sort();
    assert_eq!(hosts, vec!["a2", "n2"]);

    let candidates: Vec<String> = scheduler
        .get_l3_agent_candidates(&router, &store.list_agents().unwrap(), None)
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert!(hosts.iter().all(|h| candidates.contains(h)));
    assert_eq!(
        scheduler.snat_agent_hosting_router("r1").unwrap().unwrap().id,
        "n2"
    );
}
