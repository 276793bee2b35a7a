//! l3sched-scheduler — router-to-L3-agent placement.
//!
//! Decides which L3 agents host which logical routers and records the
//! decision as bindings in the state store. Centralized routers live on
//! exactly one agent; distributed routers fan out to every agent with local
//! workload, plus one SNAT agent when they have an external gateway.
//!
//! # Architecture
//!
//! ```text
//! RouterScheduler
//!   ├── AgentRegistry / RouterBackend (read agents, routers, ports)
//!   ├── CandidateFilter (admin state, namespaces, gateway, mode, locality)
//!   ├── SchedulingPolicy (chance | least routers)
//!   └── BindingManager → StateStore (atomic bind, race absorption)
//! ```

pub mod binding;
pub mod error;
pub mod filter;
pub mod policy;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testutil;

pub use binding::BindingManager;
pub use error::{SchedulerError, SchedulerResult};
pub use filter::{CandidateFilter, Rejection};
pub use policy::SchedulingPolicy;
pub use registry::{AgentFilters, AgentRegistry, RouterBackend, StoreRegistry};
pub use scheduler::{RouterScheduler, ScheduleOutcome, SchedulingHints};
