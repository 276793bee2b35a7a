//! l3sched-state — embedded state store for the L3 router scheduler.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for agents, routers, ports, and router↔agent bindings.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Binding keys are `{router_id}:{agent_id}`, so every binding for one router
//! is found with a prefix scan.
//!
//! redb allows a single write transaction at a time. Every binding mutation
//! performs its existence checks and its write inside one write transaction,
//! which makes "check then bind" atomic for every task sharing the store.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
