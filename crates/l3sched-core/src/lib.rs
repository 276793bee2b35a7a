//! l3sched-core — configuration shared by every scheduler component.
//!
//! The [`SchedulerConfig`] value is loaded once at process start and then
//! cloned into each component that needs it. Nothing reads configuration
//! from global state.

pub mod config;

pub use config::{ConfigError, SchedulerConfig, SchedulerDriver};
