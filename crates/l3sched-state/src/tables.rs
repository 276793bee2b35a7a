//! redb table definitions for the scheduler state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// L3 agents keyed by `{agent_id}`.
pub const AGENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("agents");

/// Logical routers keyed by `{router_id}`.
pub const ROUTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("routers");

/// Ports keyed by `{port_id}`.
pub const PORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("ports");

/// Router hosting records keyed by `{router_id}:{agent_id}`.
pub const ROUTER_BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("router_bindings");

/// Centralized SNAT agent of a distributed router, keyed by `{router_id}`.
pub const SNAT_BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("snat_bindings");
