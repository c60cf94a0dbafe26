//! Record structs produced and consumed across the containment layer.
//!
//! Breach records are created once per violation, appended to audit logs,
//! and never mutated. Kill and containment reports are the values returned
//! by the kill path. Everything here is passive data; the engines that
//! create and evaluate these records live in `warden-core` and `warden-kill`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{
    ContainmentOutcome, ContainmentStatus, KillResult, NetworkKillResult, ThresholdAction,
    WindowAction, WindowMetric, WindowSpan,
};
use crate::ids::AgentId;

// ---------------------------------------------------------------------------
// Well-Known Action Types
// ---------------------------------------------------------------------------

/// Well-known action type string constants.
///
/// Action types are free-form strings so callers can introduce their own;
/// these are the ones the default threshold table restricts. Types not
/// named in any threshold are recorded and allowed.
pub mod action_types {
    /// Reading a file from disk.
    pub const FILE_READ: &str = "file_read";
    /// Writing a file to disk.
    pub const FILE_WRITE: &str = "file_write";
    /// Deleting a file.
    pub const FILE_DELETE: &str = "file_delete";
    /// Any outbound network request.
    pub const NETWORK_REQUEST: &str = "network_request";
    /// Calling a third-party API.
    pub const EXTERNAL_API: &str = "external_api";
    /// Uploading data off the host.
    pub const DATA_UPLOAD: &str = "data_upload";
    /// Executing a shell command.
    pub const SHELL_EXEC: &str = "shell_exec";
    /// Spawning a child process.
    pub const PROCESS_SPAWN: &str = "process_spawn";
    /// Reading from a database.
    pub const DB_QUERY: &str = "db_query";
    /// Writing to a database.
    pub const DB_WRITE: &str = "db_write";
    /// A financial transaction of any size.
    pub const TRANSACTION: &str = "transaction";
    /// A financial transaction above the caller's high-value line.
    pub const HIGH_VALUE_TX: &str = "high_value_tx";
}

// ---------------------------------------------------------------------------
// Action Events
// ---------------------------------------------------------------------------

/// One observed agent action.
///
/// Ephemeral: lives only inside sliding-window buffers while it is recent
/// enough to count, then is pruned. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// The agent that attempted the action.
    pub agent_id: AgentId,
    /// Free-form action type (see [`action_types`]).
    pub action_type: String,
    /// What the action was aimed at (path, URL, table name).
    pub target: String,
    /// Payload size in bytes, if the action carries data.
    pub data_size: u64,
    /// Caller-supplied context.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// When the action was observed.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Threshold Configuration & Breaches
// ---------------------------------------------------------------------------

/// Rate limit for one action type.
///
/// Immutable once loaded into the threshold engine. `kill_multiplier`
/// scales `max_count` into the point where a breach also requests
/// containment: breaching at `max_count × kill_multiplier` events (or
/// breaching a threshold whose action is `kill`) sets `should_kill`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Human-readable name, quoted in breach records and log lines.
    pub name: String,
    /// The action type this threshold restricts.
    pub action_type: String,
    /// Maximum events allowed inside the window.
    pub max_count: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Disposition when the threshold is breached.
    pub breach_action: ThresholdAction,
    /// How long the (agent, action type) pair stays blocked after a breach.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Multiplier over `max_count` at which a breach also requests a kill.
    #[serde(default = "default_kill_multiplier")]
    pub kill_multiplier: f64,
}

/// One threshold violation. Append-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    /// Unique record id (UUID v7, time-ordered).
    pub id: Uuid,
    /// The agent that breached.
    pub agent_id: AgentId,
    /// Name of the violated threshold (`"Cooldown Active"` for cooldown blocks).
    pub threshold_name: String,
    /// The action type that was being attempted.
    pub action_type: String,
    /// Events counted in the window at breach time (0 for cooldown blocks).
    pub count: u32,
    /// The configured limit (0 for cooldown blocks).
    pub limit: u32,
    /// The configured window (0 for cooldown blocks).
    pub window_seconds: u64,
    /// The configured disposition.
    pub breach_action: ThresholdAction,
    /// Whether this breach requests containment of the agent.
    pub should_kill: bool,
    /// When the breach was evaluated.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Window Configuration & Breaches
// ---------------------------------------------------------------------------

/// Limit for one (metric, span) pair in the multi-window detector.
///
/// One metric may carry independent limits per span, e.g. an alert at
/// 10 MB out per hour and a kill at 50 MB out per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMetricThreshold {
    /// The tracked quantity.
    pub metric: WindowMetric,
    /// The horizon this limit applies to.
    pub span: WindowSpan,
    /// Cumulative limit over the span. Breach is strictly greater-than.
    pub limit: u64,
    /// Disposition when the limit is exceeded.
    pub action: WindowAction,
}

/// One windowed-metric violation. Append-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBreach {
    /// Unique record id (UUID v7, time-ordered).
    pub id: Uuid,
    /// The agent that breached.
    pub agent_id: AgentId,
    /// The metric that exceeded its limit.
    pub metric: WindowMetric,
    /// The span whose total exceeded the limit.
    pub span: WindowSpan,
    /// The windowed total at evaluation time.
    pub observed: u64,
    /// The configured limit.
    pub limit: u64,
    /// The configured disposition.
    pub action: WindowAction,
    /// When the breach was evaluated.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cached Policies
// ---------------------------------------------------------------------------

/// One previously validated decision, replayable while the validator is down.
///
/// Read-only after creation. The integrity hash covers the decision fields
/// so a tampered entry is detected on read and discarded; `warden-core`
/// computes and verifies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPolicy {
    /// The validated action type.
    pub action: String,
    /// The validated target.
    pub target: String,
    /// The validator's decision.
    pub allowed: bool,
    /// The validator's risk score (0.0 to 100.0).
    pub risk_score: f64,
    /// When the entry was created.
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being replayable.
    pub expires_at: DateTime<Utc>,
    /// First 16 hex chars of the SHA-256 over the decision fields.
    pub integrity_hash: String,
    /// Context captured at validation time. Not covered by the hash.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CachedPolicy {
    /// True once the entry has passed its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Kill & Containment Reports
// ---------------------------------------------------------------------------

/// Outcome of one escalating kill attempt against a single PID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillReport {
    /// The target process.
    pub pid: u32,
    /// How the attempt ended.
    pub result: KillResult,
    /// Whether the graceful signal was sent.
    pub soft_sent: bool,
    /// Whether the forceful signal was sent.
    pub hard_sent: bool,
    /// Milliseconds from first signal to confirmed death, when it died.
    pub time_to_death_ms: Option<u64>,
    /// Failure detail, when the attempt did not end in death.
    pub error: Option<String>,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
}

/// Outcome of applying network containment to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkKillReport {
    /// The contained agent.
    pub agent_id: AgentId,
    /// How the containment ended.
    pub result: NetworkKillResult,
    /// Which backend applied it (`"linux"`, `"macos"`, `"windows"`, `"noop"`).
    pub platform: String,
    /// Number of firewall rules applied.
    pub rules_applied: u32,
    /// Failure detail, when rules could not be applied.
    pub error: Option<String>,
    /// When the containment finished.
    pub timestamp: DateTime<Utc>,
}

/// The value returned by `kill_agent`: both containment layers, summarized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentReport {
    /// The targeted agent.
    pub agent_id: AgentId,
    /// Overall outcome across both layers.
    pub status: ContainmentOutcome,
    /// One report per PID that was bound to the agent.
    pub process_reports: Vec<KillReport>,
    /// The network layer's report, when network containment was attempted.
    pub network_report: Option<NetworkKillReport>,
    /// When the containment request completed.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Registry & Decisions
// ---------------------------------------------------------------------------

/// Registry entry binding an agent to its operating-system footprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// The registered agent.
    pub agent_id: AgentId,
    /// Every PID known to belong to the agent.
    pub pids: BTreeSet<u32>,
    /// Current containment state.
    pub status: ContainmentStatus,
    /// When the agent was first registered.
    pub registered_at: DateTime<Utc>,
}

/// The verdict of the authoritative validator on one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Risk score from 0.0 (benign) to 100.0 (certain threat).
    pub risk_score: f64,
    /// Why the validator scored it that way.
    pub reasons: Vec<String>,
}

/// The answer `check` gives the action source.
///
/// A blocked decision must not be acted on by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Why, in one line.
    pub reason: String,
    /// Risk attributed to the action (0.0 to 100.0).
    pub risk_score: f64,
    /// The threshold breach that blocked the action, when one did.
    pub breach: Option<ThresholdBreach>,
}

impl Decision {
    /// An allowing decision with the given reason and risk score.
    pub fn allow(reason: impl Into<String>, risk_score: f64) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            risk_score,
            breach: None,
        }
    }

    /// A blocking decision with the given reason and risk score.
    pub fn block(reason: impl Into<String>, risk_score: f64) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            risk_score,
            breach: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde Defaults
// ---------------------------------------------------------------------------

const fn default_cooldown_seconds() -> u64 {
    60
}

const fn default_kill_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn threshold_config_defaults_apply() {
        let json = r#"{
            "name": "Rapid File Access",
            "action_type": "file_read",
            "max_count": 100,
            "window_seconds": 60,
            "breach_action": "block"
        }"#;
        let config: ThresholdConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cooldown_seconds, 60);
        assert!((config.kill_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.breach_action, ThresholdAction::Block);
        // Every core field is required; an empty object does not parse.
        let empty: Result<ThresholdConfig, _> = serde_json::from_str("{}");
        assert!(empty.is_err());
    }

    #[test]
    fn cached_policy_expiry_is_inclusive() {
        let now = Utc::now();
        let policy = CachedPolicy {
            action: "file_read".to_owned(),
            target: "/etc/passwd".to_owned(),
            allowed: false,
            risk_score: 85.0,
            cached_at: now,
            expires_at: now,
            integrity_hash: String::new(),
            metadata: BTreeMap::new(),
        };
        // An entry is unusable from its expiry instant onward.
        assert!(policy.is_expired_at(now));
    }

    #[test]
    fn decision_constructors_set_disposition() {
        let allow = Decision::allow("within limits", 10.0);
        assert!(allow.allowed);
        assert!(allow.breach.is_none());
        let block = Decision::block("threshold breached", 80.0);
        assert!(!block.allowed);
        assert_eq!(block.reason, "threshold breached");
    }

    #[test]
    fn containment_report_roundtrips_json() {
        let report = ContainmentReport {
            agent_id: AgentId::new("agent-1"),
            status: ContainmentOutcome::Partial,
            process_reports: vec![KillReport {
                pid: 4242,
                result: KillResult::Hard,
                soft_sent: true,
                hard_sent: true,
                time_to_death_ms: Some(2100),
                error: None,
                timestamp: Utc::now(),
            }],
            network_report: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"partial\""));
        assert!(json.contains("\"hard\""));
        let back: ContainmentReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
