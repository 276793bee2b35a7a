//! Failover monitor — background task that moves routers off dead agents.
//!
//! Each cycle selects bindings held by admin-up agents whose heartbeat is
//! older than `agent_dead_limit` and reschedules every affected router.
//! One router failing to move never stops the rest of the sweep.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use l3sched_core::SchedulerConfig;
use l3sched_scheduler::RouterScheduler;
use l3sched_state::{AgentId, RouterId};

use crate::error::MonitorResult;
use crate::liveness::LivenessTracker;

/// What one failover cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailoverReport {
    /// Wall-clock time (Unix seconds) the sweep evaluated liveness at.
    pub checked_at: u64,
    pub skew_detected: bool,
    pub dead_agents: Vec<AgentId>,
    pub rescheduled: Vec<RouterId>,
    /// Routers that could not be moved, with the reason.
    pub failed: Vec<(RouterId, String)>,
}

pub struct FailoverMonitor {
    scheduler: Arc<RouterScheduler>,
    config: SchedulerConfig,
    tracker: LivenessTracker,
}

impl FailoverMonitor {
    pub fn new(scheduler: Arc<RouterScheduler>) -> Self {
        let config = scheduler.config().clone();
        Self {
            tracker: LivenessTracker::new(&config),
            scheduler,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.allow_automatic_l3agent_failover
    }

    /// Run one failover cycle as of `now` (Unix seconds).
    ///
    /// When the previous cycle is further back than `agent_down_time`, the
    /// cycle first waits `agent_dead_limit` so agents get a chance to report
    /// in, and evaluates liveness at the end of that wait.
    pub async fn check_at(&mut self, now: u64) -> MonitorResult<FailoverReport> {
        let mut report = FailoverReport {
            checked_at: now,
            ..Default::default()
        };

        if self.tracker.clock_jumped(now) {
            let wait = self.tracker.dead_limit();
            warn!(
                last_check = ?self.tracker.last_check(),
                wait_secs = wait.as_secs(),
                "time since last failover check exceeds agent_down_time, waiting for agents to report"
            );
            tokio::time::sleep(wait).await;
            report.skew_detected = true;
            report.checked_at = now.saturating_add(wait.as_secs());
        }
        self.tracker.record_check(report.checked_at);

        let cutoff = self.tracker.dead_cutoff(report.checked_at);
        let bindings = self.scheduler.bindings_on_dead_agents(cutoff)?;
        if bindings.is_empty() {
            debug!(cutoff, "no routers on dead l3 agents");
            return Ok(report);
        }

        let dead: BTreeSet<AgentId> = bindings.iter().map(|b| b.agent_id.clone()).collect();
        let routers: BTreeSet<RouterId> = bindings.into_iter().map(|b| b.router_id).collect();
        warn!(agents = ?dead, routers = routers.len(), "rescheduling routers from dead l3 agents");
        report.dead_agents = dead.into_iter().collect();

        for router_id in routers {
            match self.scheduler.reschedule_router(&router_id) {
                Ok(agents) => {
                    debug!(%router_id, ?agents, "router failed over");
                    report.rescheduled.push(router_id);
                }
                Err(e) => {
                    error!(%router_id, error = %e, "failed to reschedule router from dead l3 agent");
                    report.failed.push((router_id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Run failover cycles until `shutdown` fires.
    ///
    /// Returns immediately when automatic failover is disabled. The first
    /// cycle is delayed by a random fraction of the interval so several
    /// monitors sharing a store do not sweep in lockstep.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if !self.is_enabled() {
            info!("automatic l3 agent failover disabled");
            return;
        }

        let period = self.config.failover_interval();
        let jitter = startup_jitter(period);
        info!(interval_secs = period.as_secs(), jitter_ms = jitter.as_millis() as u64, "failover monitor started");

        tokio::select! {
            _ = tokio::time::sleep(jitter) => {}
            _ = shutdown.changed() => return,
        }

        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.check_at(epoch_secs()).await {
                        Ok(report) if report.rescheduled.is_empty() && report.failed.is_empty() => {}
                        Ok(report) => info!(
                            rescheduled = report.rescheduled.len(),
                            failed = report.failed.len(),
                            skew = report.skew_detected,
                            "failover cycle completed"
                        ),
                        Err(e) => error!(error = %e, "failover cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("failover monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

fn startup_jitter(period: Duration) -> Duration {
    let max_ms = period.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
