//! Scheduler error types.
//!
//! Only administrator-facing failures are errors. Races absorbed by the
//! binding manager and "no eligible agent" during automatic scheduling are
//! reported through [`ScheduleOutcome`](crate::ScheduleOutcome) instead.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("router not found: {0}")]
    RouterNotFound(String),

    #[error("l3 agent not found: {0}")]
    AgentNotFound(String),

    #[error("router {router_id} is not hosted by l3 agent {agent_id}")]
    BindingNotFound { router_id: String, agent_id: String },

    /// The agent cannot host the router as configured.
    #[error("router {router_id} cannot be hosted by l3 agent {agent_id}: {reason}")]
    BadConfiguration {
        router_id: String,
        agent_id: String,
        reason: String,
    },

    /// A centralized router is already hosted by another agent.
    #[error("router {router_id} is already hosted by l3 agent {agent_id}")]
    Conflict { router_id: String, agent_id: String },

    #[error("failed rescheduling router {0}: no eligible l3 agent found")]
    ReschedulingFailed(String),

    #[error("state store error: {0}")]
    State(#[from] l3sched_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
