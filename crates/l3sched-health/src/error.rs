use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failover check failed: {0}")]
    Scheduler(#[from] l3sched_scheduler::SchedulerError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
