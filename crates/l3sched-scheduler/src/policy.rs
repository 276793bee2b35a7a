//! Placement policies.
//!
//! Picks one agent out of an eligible candidate set for a centralized router
//! (or for the SNAT part of a distributed one). The variant is fixed when the
//! scheduler is built.

use rand::Rng;
use rand::seq::SliceRandom;

use l3sched_core::SchedulerDriver;
use l3sched_state::{Agent, AgentId, StateStore};

use crate::error::SchedulerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// Uniform random pick.
    Chance,
    /// Candidate hosting the fewest routers; ties broken at random.
    LeastRouters,
}

impl SchedulingPolicy {
    pub fn from_driver(driver: SchedulerDriver) -> Self {
        match driver {
            SchedulerDriver::Chance => Self::Chance,
            SchedulerDriver::LeastRouters => Self::LeastRouters,
        }
    }

    /// Choose one candidate. Returns `None` only for an empty slice.
    pub fn choose<'a>(
        &self,
        candidates: &'a [Agent],
        state: &StateStore,
    ) -> SchedulerResult<Option<&'a Agent>> {
        let mut rng = rand::thread_rng();
        match self {
            Self::Chance => Ok(candidates.choose(&mut rng)),
            Self::LeastRouters => {
                if candidates.len() <= 1 {
                    return Ok(candidates.first());
                }
                let ids: Vec<AgentId> = candidates.iter().map(|a| a.id.clone()).collect();
                let counts = state.count_bindings_by_agent(&ids)?;
                let load = |a: &Agent| counts.get(&a.id).copied().unwrap_or(0);

                let Some(min) = candidates.iter().map(load).min() else {
                    return Ok(None);
                };
                let least: Vec<&Agent> = candidates.iter().filter(|&a| load(a) == min).collect();
                Ok(Some(least[rng.gen_range(0..least.len())]))
            }
        }
    }
}
