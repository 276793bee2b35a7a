//! StateStore — redb-backed persistence for the L3 router scheduler.
//!
//! Provides typed CRUD over agents, routers, and ports, and the binding
//! transactions the scheduler relies on. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// redb locks the file, so one process owns a store at a time; clones of
    /// the returned handle share it within that process.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::AlreadyOpen(path.display().to_string()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for table in [AGENTS, ROUTERS, PORTS, ROUTER_BINDINGS, SNAT_BINDINGS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON helpers ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        validate_id(key)?;
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Agents ─────────────────────────────────────────────────────

    /// Insert or update an agent record.
    pub fn put_agent(&self, agent: &Agent) -> StateResult<()> {
        self.put_json(AGENTS, &agent.id, agent)?;
        debug!(agent_id = %agent.id, host = %agent.host, "agent stored");
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        self.get_json(AGENTS, agent_id)
    }

    pub fn list_agents(&self) -> StateResult<Vec<Agent>> {
        self.list_json(AGENTS)
    }

    /// Find the agent running on a host.
    pub fn get_agent_by_host(&self, host: &str) -> StateResult<Option<Agent>> {
        Ok(self.list_agents()?.into_iter().find(|a| a.host == host))
    }

    /// Refresh an agent's heartbeat. Returns false for unknown agents.
    pub fn touch_agent(&self, agent_id: &str, heartbeat_timestamp: u64) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let found = {
            let mut t = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let current: Option<Agent> = match t.get(agent_id).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            match current {
                Some(mut agent) => {
                    agent.heartbeat_timestamp = heartbeat_timestamp;
                    let bytes = serde_json::to_vec(&agent).map_err(map_err!(Serialize))?;
                    t.insert(agent_id, bytes.as_slice()).map_err(map_err!(Write))?;
                    true
                }
                None => false,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(found)
    }

    /// Delete an agent together with every binding that references it.
    /// Returns true if the agent existed.
    pub fn delete_agent(&self, agent_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let mut removed = 0usize;
        {
            let mut agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            existed = agents.remove(agent_id).map_err(map_err!(Write))?.is_some();

            for table in [ROUTER_BINDINGS, SNAT_BINDINGS] {
                let mut t = txn.open_table(table).map_err(map_err!(Table))?;
                let stale = keys_where(&t, |b| b.agent_id == agent_id)?;
                for key in &stale {
                    t.remove(key.as_str()).map_err(map_err!(Write))?;
                }
                removed += stale.len();
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%agent_id, existed, bindings_removed = removed, "agent deleted");
        Ok(existed)
    }

    // ── Routers ────────────────────────────────────────────────────

    pub fn put_router(&self, router: &Router) -> StateResult<()> {
        self.put_json(ROUTERS, &router.id, router)?;
        debug!(router_id = %router.id, distributed = router.distributed, "router stored");
        Ok(())
    }

    pub fn get_router(&self, router_id: &str) -> StateResult<Option<Router>> {
        self.get_json(ROUTERS, router_id)
    }

    pub fn list_routers(&self) -> StateResult<Vec<Router>> {
        self.list_json(ROUTERS)
    }

    /// Delete a router together with its bindings. Returns true if it existed.
    pub fn delete_router(&self, router_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut routers = txn.open_table(ROUTERS).map_err(map_err!(Table))?;
            existed = routers.remove(router_id).map_err(map_err!(Write))?.is_some();

            let mut bindings = txn.open_table(ROUTER_BINDINGS).map_err(map_err!(Table))?;
            for (key, _) in scan_prefix(&bindings, &router_binding_prefix(router_id))? {
                bindings.remove(key.as_str()).map_err(map_err!(Write))?;
            }

            let mut snat = txn.open_table(SNAT_BINDINGS).map_err(map_err!(Table))?;
            snat.remove(router_id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%router_id, existed, "router deleted");
        Ok(existed)
    }

    // ── Ports ──────────────────────────────────────────────────────

    pub fn put_port(&self, port: &Port) -> StateResult<()> {
        self.put_json(PORTS, &port.id, port)
    }

    pub fn get_port(&self, port_id: &str) -> StateResult<Option<Port>> {
        self.get_json(PORTS, port_id)
    }

    /// List ports matching a filter.
    pub fn list_ports(&self, filter: &PortFilter) -> StateResult<Vec<Port>> {
        let ports: Vec<Port> = self.list_json(PORTS)?;
        Ok(ports.into_iter().filter(|p| filter.matches(p)).collect())
    }

    pub fn delete_port(&self, port_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(PORTS).map_err(map_err!(Table))?;
            existed = t.remove(port_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Router bindings ────────────────────────────────────────────

    /// Record that `agent_id` hosts `router_id`.
    ///
    /// Existence of both ends and of the pair itself are checked in the same
    /// write transaction as the insert. Only [`BindOutcome::Created`] writes.
    pub fn insert_binding(&self, router_id: &str, agent_id: &str) -> StateResult<BindOutcome> {
        self.bind(router_id, agent_id, false)
    }

    /// Like [`insert_binding`](Self::insert_binding), but refuses when the
    /// router is already hosted by any other agent.
    ///
    /// This is the single-owner write used for centralized routers; the
    /// check and the insert happen atomically.
    pub fn insert_exclusive_binding(
        &self,
        router_id: &str,
        agent_id: &str,
    ) -> StateResult<BindOutcome> {
        self.bind(router_id, agent_id, true)
    }

    fn bind(&self, router_id: &str, agent_id: &str, exclusive: bool) -> StateResult<BindOutcome> {
        validate_id(router_id)?;
        validate_id(agent_id)?;
        let binding = RouterAgentBinding::new(router_id, agent_id);
        let key = binding.table_key();
        let bytes = serde_json::to_vec(&binding).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let routers = txn.open_table(ROUTERS).map_err(map_err!(Table))?;
            let agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let mut bindings = txn.open_table(ROUTER_BINDINGS).map_err(map_err!(Table))?;

            if routers.get(router_id).map_err(map_err!(Read))?.is_none() {
                BindOutcome::RouterGone
            } else if agents.get(agent_id).map_err(map_err!(Read))?.is_none() {
                BindOutcome::AgentGone
            } else if bindings.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                BindOutcome::AlreadyBound
            } else {
                let holder = if exclusive {
                    scan_prefix(&bindings, &router_binding_prefix(router_id))?
                        .into_iter()
                        .next()
                        .map(|(_, b)| b.agent_id)
                } else {
                    None
                };
                match holder {
                    Some(agent_id) => BindOutcome::AlreadyHosted { agent_id },
                    None => {
                        bindings
                            .insert(key.as_str(), bytes.as_slice())
                            .map_err(map_err!(Write))?;
                        BindOutcome::Created
                    }
                }
            }
        };

        if outcome.is_created() {
            txn.commit().map_err(map_err!(Transaction))?;
        } else {
            txn.abort().map_err(map_err!(Transaction))?;
        }
        debug!(%router_id, %agent_id, exclusive, ?outcome, "bind attempted");
        Ok(outcome)
    }

    /// Delete one binding. Returns true if it existed.
    pub fn remove_binding(&self, router_id: &str, agent_id: &str) -> StateResult<bool> {
        let key = binding_key(router_id, agent_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(ROUTER_BINDINGS).map_err(map_err!(Table))?;
            existed = t.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// List the bindings of one router.
    pub fn list_router_bindings(&self, router_id: &str) -> StateResult<Vec<RouterAgentBinding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(ROUTER_BINDINGS).map_err(map_err!(Table))?;
        Ok(scan_prefix(&t, &router_binding_prefix(router_id))?
            .into_iter()
            .map(|(_, b)| b)
            .collect())
    }

    /// List the bindings of one agent.
    pub fn list_agent_bindings(&self, agent_id: &str) -> StateResult<Vec<RouterAgentBinding>> {
        Ok(self
            .list_bindings()?
            .into_iter()
            .filter(|b| b.agent_id == agent_id)
            .collect())
    }

    pub fn list_bindings(&self) -> StateResult<Vec<RouterAgentBinding>> {
        self.list_json(ROUTER_BINDINGS)
    }

    /// Count bindings per agent in one pass over the bindings table.
    ///
    /// Every requested agent id is present in the result, with zero when it
    /// hosts nothing.
    pub fn count_bindings_by_agent(&self, agent_ids: &[AgentId]) -> StateResult<HashMap<AgentId, usize>> {
        let mut counts: HashMap<AgentId, usize> =
            agent_ids.iter().map(|id| (id.clone(), 0)).collect();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(ROUTER_BINDINGS).map_err(map_err!(Table))?;
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let binding: RouterAgentBinding = decode(value.value())?;
            if let Some(count) = counts.get_mut(&binding.agent_id) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    /// Bindings whose agent is administratively up but has not sent a
    /// heartbeat since `cutoff` (exclusive).
    ///
    /// Agents and bindings are read from the same snapshot.
    pub fn list_bindings_on_dead_agents(&self, cutoff: u64) -> StateResult<Vec<RouterAgentBinding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
        let mut dead: HashSet<AgentId> = HashSet::new();
        for entry in agents.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let agent: Agent = decode(value.value())?;
            if agent.admin_state_up && agent.heartbeat_timestamp < cutoff {
                dead.insert(agent.id);
            }
        }
        if dead.is_empty() {
            return Ok(Vec::new());
        }

        let bindings = txn.open_table(ROUTER_BINDINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in bindings.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let binding: RouterAgentBinding = decode(value.value())?;
            if dead.contains(&binding.agent_id) {
                results.push(binding);
            }
        }
        Ok(results)
    }

    // ── SNAT bindings ──────────────────────────────────────────────

    /// Record the centralized SNAT agent of a distributed router.
    ///
    /// A router has at most one SNAT agent; a second insert for a different
    /// agent reports [`BindOutcome::AlreadyHosted`].
    pub fn insert_snat_binding(&self, router_id: &str, agent_id: &str) -> StateResult<BindOutcome> {
        validate_id(router_id)?;
        validate_id(agent_id)?;
        let binding = RouterAgentBinding::new(router_id, agent_id);
        let bytes = serde_json::to_vec(&binding).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let routers = txn.open_table(ROUTERS).map_err(map_err!(Table))?;
            let agents = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let mut snat = txn.open_table(SNAT_BINDINGS).map_err(map_err!(Table))?;

            let existing: Option<RouterAgentBinding> =
                match snat.get(router_id).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };

            if routers.get(router_id).map_err(map_err!(Read))?.is_none() {
                BindOutcome::RouterGone
            } else if agents.get(agent_id).map_err(map_err!(Read))?.is_none() {
                BindOutcome::AgentGone
            } else {
                match existing {
                    Some(b) if b.agent_id == agent_id => BindOutcome::AlreadyBound,
                    Some(b) => BindOutcome::AlreadyHosted { agent_id: b.agent_id },
                    None => {
                        snat.insert(router_id, bytes.as_slice())
                            .map_err(map_err!(Write))?;
                        BindOutcome::Created
                    }
                }
            }
        };

        if outcome.is_created() {
            txn.commit().map_err(map_err!(Transaction))?;
        } else {
            txn.abort().map_err(map_err!(Transaction))?;
        }
        Ok(outcome)
    }

    pub fn get_snat_binding(&self, router_id: &str) -> StateResult<Option<RouterAgentBinding>> {
        self.get_json(SNAT_BINDINGS, router_id)
    }

    /// Delete the SNAT binding of a router. Returns true if it existed.
    pub fn remove_snat_binding(&self, router_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(SNAT_BINDINGS).map_err(map_err!(Table))?;
            existed = t.remove(router_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Ids become table keys and binding key components.
fn validate_id(id: &str) -> StateResult<()> {
    if id.is_empty() || id.contains(':') {
        return Err(StateError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Bindings whose key starts with `prefix`, in key order.
fn scan_prefix<T>(table: &T, prefix: &str) -> StateResult<Vec<(String, RouterAgentBinding)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.range(prefix..).map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if !key.value().starts_with(prefix) {
            break;
        }
        results.push((key.value().to_string(), decode(value.value())?));
    }
    Ok(results)
}

/// Keys of bindings matching a predicate.
fn keys_where<T, F>(table: &T, pred: F) -> StateResult<Vec<String>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
    F: Fn(&RouterAgentBinding) -> bool,
{
    let mut keys = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let binding: RouterAgentBinding = decode(value.value())?;
        if pred(&binding) {
            keys.push(key.value().to_string());
        }
    }
    Ok(keys)
}
