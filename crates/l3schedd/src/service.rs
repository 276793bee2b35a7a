//! Service composition: one store, one scheduler, one failover monitor.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use l3sched_core::SchedulerConfig;
use l3sched_health::FailoverMonitor;
use l3sched_scheduler::{RouterScheduler, StoreRegistry};
use l3sched_state::{Agent, AgentId, StateError, StateStore};

const DB_FILE: &str = "l3sched.redb";

pub struct L3Service {
    state: StateStore,
    registry: Arc<StoreRegistry>,
    scheduler: Arc<RouterScheduler>,
    monitor: FailoverMonitor,
}

impl L3Service {
    /// Open (or create) the store under `data_dir` and compose the service.
    ///
    /// Fails while another process (typically a running `l3schedd run`)
    /// owns the same data directory.
    pub fn open(data_dir: &Path, config: SchedulerConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE);
        let state = match StateStore::open(&db_path) {
            Ok(state) => state,
            Err(StateError::AlreadyOpen(path)) => {
                anyhow::bail!(
                    "state store {path} is owned by another l3schedd process; \
                     stop the daemon before running one-shot commands on {}",
                    data_dir.display()
                )
            }
            Err(e) => return Err(e.into()),
        };
        info!(path = ?db_path, "state store opened");
        Ok(Self::from_store(state, config))
    }

    pub fn from_store(state: StateStore, config: SchedulerConfig) -> Self {
        let registry = Arc::new(StoreRegistry::new(state.clone(), &config));
        let scheduler = Arc::new(RouterScheduler::with_backends(
            config,
            state.clone(),
            registry.clone(),
            registry.clone(),
        ));
        let monitor = FailoverMonitor::new(scheduler.clone());
        info!(
            driver = %scheduler.config().router_scheduler_driver,
            failover = monitor.is_enabled(),
            "l3 scheduler service initialized"
        );
        Self {
            state,
            registry,
            scheduler,
            monitor,
        }
    }

    /// Ingest an agent heartbeat and, when enabled, schedule unhosted
    /// routers onto it.
    pub fn report_state(&self, agent: &Agent) -> anyhow::Result<bool> {
        self.registry.report_state(agent)?;
        let scheduled = self.scheduler.auto_schedule_routers(&agent.host, None)?;
        debug!(agent_id = %agent.id, host = %agent.host, scheduled, "agent state reported");
        Ok(scheduled)
    }

    pub fn reschedule(&self, router_id: &str) -> anyhow::Result<Vec<AgentId>> {
        Ok(self.scheduler.reschedule_router(router_id)?)
    }

    pub fn hosting(&self, router_id: &str) -> anyhow::Result<Vec<Agent>> {
        Ok(self.scheduler.list_l3_agents_hosting_router(router_id)?)
    }

    /// Run the failover monitor until `shutdown` fires.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            agents = self.state.list_agents()?.len(),
            routers = self.state.list_routers()?.len(),
            bindings = self.state.list_bindings()?.len(),
            "serving l3 scheduler state"
        );
        self.monitor.spawn(shutdown).await?;
        Ok(())
    }
}
