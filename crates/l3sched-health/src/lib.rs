//! l3sched-health — automatic L3 agent failover.
//!
//! Detects agents that stopped sending heartbeats and moves their routers
//! to live agents through the router scheduler.
//!
//! # Architecture
//!
//! ```text
//! FailoverMonitor
//!   ├── LivenessTracker (dead limit, cutoff, clock-jump guard)
//!   └── RouterScheduler
//!       ├── bindings_on_dead_agents(cutoff)
//!       └── reschedule_router() per affected router
//! ```
//!
//! The monitor only runs when `allow_automatic_l3agent_failover` is set.
//! An agent counts as dead once its heartbeat is older than twice
//! `agent_down_time`; agents that are administratively down are never
//! failed over.

pub mod error;
pub mod liveness;
pub mod monitor;

pub use error::{MonitorError, MonitorResult};
pub use liveness::LivenessTracker;
pub use monitor::{FailoverMonitor, FailoverReport};
