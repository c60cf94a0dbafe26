//! Agent registry: which PIDs belong to which agent, and what state
//! each agent is in.
//!
//! Containment is useless if Warden does not know which processes an
//! agent owns, so registration is the first thing an integration does.
//! The registry is deliberately dumb: a locked map of [`AgentRecord`]s
//! with no policy of its own. Status transitions are decided by the
//! supervisor; the registry only stores them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use warden_types::{AgentId, AgentRecord, ContainmentStatus};

/// Thread-safe map of registered agents.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    inner: Mutex<BTreeMap<AgentId, AgentRecord>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register an agent (or add a PID to an existing one), as of now.
    ///
    /// Returns the number of PIDs now bound to the agent. A fresh
    /// registration starts [`ContainmentStatus::Active`].
    pub fn register(&self, agent_id: &AgentId, pid: u32) -> usize {
        self.register_at(agent_id, pid, Utc::now())
    }

    /// Register as of an explicit instant.
    pub fn register_at(&self, agent_id: &AgentId, pid: u32, now: DateTime<Utc>) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            error!("agent registry lock poisoned, dropping registration");
            return 0;
        };
        let record = inner.entry(agent_id.clone()).or_insert_with(|| AgentRecord {
            agent_id: agent_id.clone(),
            pids: BTreeSet::new(),
            status: ContainmentStatus::Active,
            registered_at: now,
        });
        record.pids.insert(pid);
        info!(agent_id = %agent_id, pid, pids = record.pids.len(), "agent registered");
        record.pids.len()
    }

    /// Ensure the agent has a record, creating a PID-less one if needed.
    ///
    /// Called on the check path so that an agent observed acting before
    /// anyone registered its processes still has a registry entry to
    /// carry status transitions. Returns `true` when a record was created.
    pub fn observe_at(&self, agent_id: &AgentId, now: DateTime<Utc>) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            error!("agent registry lock poisoned, dropping observation");
            return false;
        };
        if inner.contains_key(agent_id) {
            return false;
        }
        inner.insert(
            agent_id.clone(),
            AgentRecord {
                agent_id: agent_id.clone(),
                pids: BTreeSet::new(),
                status: ContainmentStatus::Active,
                registered_at: now,
            },
        );
        info!(agent_id = %agent_id, "agent observed without registration");
        true
    }

    /// Add a PID to an already-registered agent.
    ///
    /// Returns `false` if the agent is unknown; unknown agents must go
    /// through [`register`](Self::register) so they get a record.
    pub fn add_pid(&self, agent_id: &AgentId, pid: u32) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            error!("agent registry lock poisoned, dropping pid");
            return false;
        };
        match inner.get_mut(agent_id) {
            Some(record) => {
                record.pids.insert(pid);
                true
            }
            None => false,
        }
    }

    /// Remove an agent entirely, returning its final record.
    pub fn unregister(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        let Ok(mut inner) = self.inner.lock() else {
            error!("agent registry lock poisoned, unregister dropped");
            return None;
        };
        let removed = inner.remove(agent_id);
        if removed.is_some() {
            info!(agent_id = %agent_id, "agent unregistered");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The agent's current record, if registered.
    pub fn get(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.get(agent_id).cloned())
    }

    /// Every PID bound to the agent (empty when unregistered).
    pub fn pids_of(&self, agent_id: &AgentId) -> Vec<u32> {
        self.inner.lock().map_or_else(
            |_| Vec::new(),
            |inner| {
                inner
                    .get(agent_id)
                    .map(|record| record.pids.iter().copied().collect())
                    .unwrap_or_default()
            },
        )
    }

    /// Every registered record, in id order.
    pub fn list(&self) -> Vec<AgentRecord> {
        self.inner
            .lock()
            .map_or_else(|_| Vec::new(), |inner| inner.values().cloned().collect())
    }

    /// Every registered id, in order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.inner
            .lock()
            .map_or_else(|_| Vec::new(), |inner| inner.keys().cloned().collect())
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.len())
    }

    /// Whether no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Record a status transition. Returns `false` for unknown agents.
    pub fn set_status(&self, agent_id: &AgentId, status: ContainmentStatus) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            error!("agent registry lock poisoned, status transition dropped");
            return false;
        };
        match inner.get_mut(agent_id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Agent counts grouped by status label (`"active"`, `"network_blocked"`, ...).
    pub fn count_by_status(&self) -> BTreeMap<String, usize> {
        let Ok(inner) = self.inner.lock() else {
            error!("agent registry lock poisoned, status counts unavailable");
            return BTreeMap::new();
        };
        let mut counts = BTreeMap::new();
        for record in inner.values() {
            let slot: &mut usize = counts.entry(record.status.label().to_owned()).or_default();
            *slot = slot.saturating_add(1);
        }
        counts
    }
}
