//! Network containment bookkeeping over a firewall backend.
//!
//! [`NetworkKillManager`] owns the backend chosen at startup and remembers
//! which agents it has blocked, so repeat blocks are collapsed and
//! `restore_all` can undo exactly what was installed.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use warden_types::{AgentId, NetworkKillReport, NetworkKillResult};

use crate::firewall::FirewallBackend;

/// Snapshot of the network containment layer.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    /// Label of the active backend.
    pub platform: String,
    /// Number of agents currently blocked.
    pub blocked_agents: usize,
    /// Ids of the blocked agents, in id order.
    pub blocked: Vec<AgentId>,
    /// Rules the backend currently enforces.
    pub active_rules: Vec<String>,
}

/// Tracks which agents are network-contained and drives the backend.
pub struct NetworkKillManager {
    backend: Box<dyn FirewallBackend>,
    blocked: Mutex<BTreeMap<AgentId, NetworkKillReport>>,
}

impl NetworkKillManager {
    /// Creates a manager over the given backend.
    #[must_use]
    pub fn new(backend: Box<dyn FirewallBackend>) -> Self {
        Self {
            backend,
            blocked: Mutex::new(BTreeMap::new()),
        }
    }

    /// Label of the active backend.
    #[must_use]
    pub fn platform(&self) -> &'static str {
        self.backend.platform()
    }

    /// Blocks all traffic for an agent.
    ///
    /// Blocking an agent twice returns the original report; the backend is
    /// not asked to duplicate its rules.
    pub async fn kill_network(&self, agent_id: &AgentId) -> NetworkKillReport {
        if let Some(existing) = self.lookup(agent_id) {
            debug!(agent_id = %agent_id, "network already blocked");
            return existing;
        }
        let outcome = self.backend.block_all(agent_id.as_str()).await;
        let report = NetworkKillReport {
            agent_id: agent_id.clone(),
            result: outcome.result,
            platform: self.backend.platform().to_owned(),
            rules_applied: outcome.rules_applied,
            error: outcome.error,
            timestamp: Utc::now(),
        };
        match report.result {
            NetworkKillResult::Success => {
                info!(agent_id = %agent_id, rules = report.rules_applied, "network blocked");
                self.remember(report.clone());
            }
            NetworkKillResult::Partial => {
                warn!(
                    agent_id = %agent_id,
                    rules = report.rules_applied,
                    "network only partially blocked"
                );
                self.remember(report.clone());
            }
            _ => {
                error!(
                    agent_id = %agent_id,
                    result = ?report.result,
                    error = report.error.as_deref().unwrap_or(""),
                    "network block failed"
                );
            }
        }
        report
    }

    /// Lifts the network block for an agent.
    ///
    /// The agent stays recorded as blocked unless the backend fully removes
    /// its rules.
    pub async fn restore_network(&self, agent_id: &AgentId) -> NetworkKillReport {
        let outcome = self.backend.restore(agent_id.as_str()).await;
        let report = NetworkKillReport {
            agent_id: agent_id.clone(),
            result: outcome.result,
            platform: self.backend.platform().to_owned(),
            rules_applied: outcome.rules_applied,
            error: outcome.error,
            timestamp: Utc::now(),
        };
        if report.result.is_success() {
            self.forget(agent_id);
            info!(agent_id = %agent_id, rules = report.rules_applied, "network restored");
        } else {
            warn!(
                agent_id = %agent_id,
                result = ?report.result,
                "network restore did not complete"
            );
        }
        report
    }

    /// Lifts every block this manager installed.
    pub async fn restore_all(&self) -> Vec<NetworkKillReport> {
        let agents = self.blocked_agents();
        let mut reports = Vec::with_capacity(agents.len());
        for agent_id in agents {
            reports.push(self.restore_network(&agent_id).await);
        }
        reports
    }

    /// True when the agent is currently recorded as blocked.
    #[must_use]
    pub fn is_blocked(&self, agent_id: &AgentId) -> bool {
        self.lookup(agent_id).is_some()
    }

    /// Ids currently blocked, in id order.
    #[must_use]
    pub fn blocked_agents(&self) -> Vec<AgentId> {
        let Ok(blocked) = self.blocked.lock() else {
            error!("network bookkeeping lock poisoned");
            return Vec::new();
        };
        blocked.keys().cloned().collect()
    }

    /// Snapshot of this layer for status endpoints.
    pub async fn status(&self) -> NetworkStatus {
        let blocked = self.blocked_agents();
        NetworkStatus {
            platform: self.backend.platform().to_owned(),
            blocked_agents: blocked.len(),
            blocked,
            active_rules: self.backend.list_rules().await,
        }
    }

    fn lookup(&self, agent_id: &AgentId) -> Option<NetworkKillReport> {
        let Ok(blocked) = self.blocked.lock() else {
            error!("network bookkeeping lock poisoned");
            return None;
        };
        blocked.get(agent_id).cloned()
    }

    fn remember(&self, report: NetworkKillReport) {
        let Ok(mut blocked) = self.blocked.lock() else {
            error!("network bookkeeping lock poisoned");
            return;
        };
        blocked.insert(report.agent_id.clone(), report);
    }

    fn forget(&self, agent_id: &AgentId) {
        let Ok(mut blocked) = self.blocked.lock() else {
            error!("network bookkeeping lock poisoned");
            return;
        };
        blocked.remove(agent_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::firewall::{FirewallOutcome, NoopFirewall};
    use async_trait::async_trait;

    fn manager() -> NetworkKillManager {
        NetworkKillManager::new(Box::new(NoopFirewall::new()))
    }

    /// Backend that can be scripted to refuse blocks or restores.
    struct ScriptedBackend {
        fail_block: bool,
        fail_restore: bool,
    }

    #[async_trait]
    impl FirewallBackend for ScriptedBackend {
        fn platform(&self) -> &'static str {
            "scripted"
        }

        async fn block_all(&self, _id: &str) -> FirewallOutcome {
            if self.fail_block {
                FirewallOutcome::failed("refused".to_owned())
            } else {
                FirewallOutcome::success(1)
            }
        }

        async fn block_ip(&self, _ip: &str) -> FirewallOutcome {
            FirewallOutcome::success(1)
        }

        async fn restore(&self, _id: &str) -> FirewallOutcome {
            if self.fail_restore {
                FirewallOutcome::failed("refused".to_owned())
            } else {
                FirewallOutcome::success(1)
            }
        }

        async fn is_blocked(&self, _id: &str) -> bool {
            false
        }

        async fn list_rules(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn kill_network_records_the_block() {
        let manager = manager();
        let agent = AgentId::from("agent-1");

        let report = manager.kill_network(&agent).await;

        assert_eq!(report.result, NetworkKillResult::Success);
        assert_eq!(report.rules_applied, 1);
        assert_eq!(report.platform, "noop");
        assert!(manager.is_blocked(&agent));

        let status = manager.status().await;
        assert_eq!(status.blocked_agents, 1);
        assert_eq!(status.blocked, vec![agent]);
    }

    #[tokio::test]
    async fn repeat_kills_return_the_original_report() {
        let manager = manager();
        let agent = AgentId::from("agent-1");

        let first = manager.kill_network(&agent).await;
        let second = manager.kill_network(&agent).await;

        assert_eq!(second, first);
        assert_eq!(manager.status().await.active_rules.len(), 1);
    }

    #[tokio::test]
    async fn restore_clears_the_block() {
        let manager = manager();
        let agent = AgentId::from("agent-1");
        manager.kill_network(&agent).await;

        let report = manager.restore_network(&agent).await;

        assert_eq!(report.result, NetworkKillResult::Success);
        assert!(!manager.is_blocked(&agent));
        assert!(manager.blocked_agents().is_empty());
    }

    #[tokio::test]
    async fn restore_all_sweeps_every_agent() {
        let manager = manager();
        for name in ["a", "b", "c"] {
            manager.kill_network(&AgentId::from(name)).await;
        }

        let reports = manager.restore_all().await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.result.is_success()));
        assert!(manager.blocked_agents().is_empty());
    }

    #[tokio::test]
    async fn failed_blocks_are_not_recorded() {
        let manager = NetworkKillManager::new(Box::new(ScriptedBackend {
            fail_block: true,
            fail_restore: false,
        }));
        let agent = AgentId::from("agent-1");

        let report = manager.kill_network(&agent).await;

        assert_eq!(report.result, NetworkKillResult::Failed);
        assert_eq!(report.error.as_deref(), Some("refused"));
        assert!(!manager.is_blocked(&agent));
    }

    #[tokio::test]
    async fn failed_restores_keep_the_agent_recorded() {
        let manager = NetworkKillManager::new(Box::new(ScriptedBackend {
            fail_block: false,
            fail_restore: true,
        }));
        let agent = AgentId::from("agent-1");
        manager.kill_network(&agent).await;

        let report = manager.restore_network(&agent).await;

        assert_eq!(report.result, NetworkKillResult::Failed);
        assert!(manager.is_blocked(&agent));
    }
}
