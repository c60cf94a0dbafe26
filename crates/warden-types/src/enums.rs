//! Enumeration types for the Warden containment layer.
//!
//! Dispositions, window spans and metrics, fail modes, and the result codes
//! reported by the kill path. All enums serialize as lowercase or snake_case
//! strings so YAML config files and JSON payloads read naturally.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Threshold Dispositions
// ---------------------------------------------------------------------------

/// What happens when an action-rate threshold is breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdAction {
    /// Log the breach; the action itself is still blocked for this window.
    Warn,
    /// Block the action and start the cooldown.
    Block,
    /// Block the action; the caller should slow the agent down.
    Throttle,
    /// Block the action and request containment of the agent.
    Kill,
}

// ---------------------------------------------------------------------------
// Sliding Window Spans & Metrics
// ---------------------------------------------------------------------------

/// Time horizon of one sliding accumulator.
///
/// Every metric is tracked over all three spans simultaneously so that
/// activity paced below a short-window limit still accumulates into the
/// longer horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WindowSpan {
    /// Short horizon: one hour.
    #[serde(rename = "1h")]
    Hour1,
    /// Medium horizon: six hours.
    #[serde(rename = "6h")]
    Hour6,
    /// Long horizon: twenty-four hours.
    #[serde(rename = "24h")]
    Hour24,
}

impl WindowSpan {
    /// All spans, shortest first. Every detector tracks all of them.
    pub const ALL: [Self; 3] = [Self::Hour1, Self::Hour6, Self::Hour24];

    /// Length of the span in seconds.
    pub const fn seconds(self) -> i64 {
        match self {
            Self::Hour1 => 3_600,
            Self::Hour6 => 21_600,
            Self::Hour24 => 86_400,
        }
    }

    /// Short label used in config files and log lines (`"1h"`, `"6h"`, `"24h"`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hour1 => "1h",
            Self::Hour6 => "6h",
            Self::Hour24 => "24h",
        }
    }
}

/// A cumulative quantity tracked by the multi-window detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMetric {
    /// Bytes sent out of the host (uploads, request bodies).
    BytesOut,
    /// Bytes read into the agent (downloads, file reads).
    BytesIn,
    /// Individual records touched in data stores.
    RecordsAccessed,
    /// Calls to external APIs.
    ApiCalls,
    /// Files opened for reading.
    FilesRead,
    /// Network connections opened.
    Connections,
}

impl WindowMetric {
    /// All tracked metrics. Every detector carries a lane for each.
    pub const ALL: [Self; 6] = [
        Self::BytesOut,
        Self::BytesIn,
        Self::RecordsAccessed,
        Self::ApiCalls,
        Self::FilesRead,
        Self::Connections,
    ];

    /// Metric name as it appears in config files and log lines.
    pub const fn label(self) -> &'static str {
        match self {
            Self::BytesOut => "bytes_out",
            Self::BytesIn => "bytes_in",
            Self::RecordsAccessed => "records_accessed",
            Self::ApiCalls => "api_calls",
            Self::FilesRead => "files_read",
            Self::Connections => "connections",
        }
    }
}

/// What happens when a windowed metric exceeds its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAction {
    /// Emit a breach for operators; the agent keeps running.
    Alert,
    /// Emit a breach and request containment of the agent.
    Kill,
}

// ---------------------------------------------------------------------------
// Fail Modes
// ---------------------------------------------------------------------------

/// Behavior when the authoritative validator is unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Deny everything while the validator is down. The safe default.
    #[default]
    Closed,
    /// Replay previously validated decisions from the policy cache;
    /// anything not cached falls back to closed behavior.
    Cached,
    /// Allow everything while the validator is down. Dangerous; must be
    /// chosen explicitly and is logged at error severity.
    Open,
}

// ---------------------------------------------------------------------------
// Kill & Containment Results
// ---------------------------------------------------------------------------

/// Outcome of one escalating kill attempt against a single PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillResult {
    /// Terminated, phase not distinguished. Callers that collapse the
    /// soft/hard detail report this.
    Success,
    /// The process was not running when the kill started.
    AlreadyDead,
    /// Terminated by the graceful signal within the grace period.
    Soft,
    /// Required the forceful signal.
    Hard,
    /// Could not be terminated (signalling failed for a non-permission reason).
    Failed,
    /// We lack the rights to signal the process. Never retried automatically.
    PermissionDenied,
    /// Survived the forceful signal; likely a zombie or kernel-protected.
    Zombie,
}

impl KillResult {
    /// True when the target is no longer running.
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Success | Self::AlreadyDead | Self::Soft | Self::Hard)
    }
}

/// Outcome of applying network containment to one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKillResult {
    /// Every rule applied.
    Success,
    /// Some rules applied, some failed. The agent is partially blocked.
    Partial,
    /// No rules could be applied.
    Failed,
    /// The firewall tool refused us (not running as root/admin).
    PermissionDenied,
    /// No backend exists for this platform.
    NotSupported,
}

impl NetworkKillResult {
    /// True when the block is fully in place.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Containment state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentStatus {
    /// Running normally; actions are checked but not blocked wholesale.
    Active,
    /// Network containment is in place; processes may still be running.
    NetworkBlocked,
    /// Processes are dead; network containment failed or was not attempted.
    ProcessKilled,
    /// Exactly one containment layer succeeded. The agent stays registered
    /// so the failed layer can be retried.
    PartiallyContained,
    /// Both layers succeeded (or the network layer was verified not
    /// applicable). Terminal.
    FullyContained,
}

impl ContainmentStatus {
    /// True when the agent must be blocked outright on every check.
    pub const fn is_contained(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Short label matching the serialized form, for status maps and logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::NetworkBlocked => "network_blocked",
            Self::ProcessKilled => "process_killed",
            Self::PartiallyContained => "partially_contained",
            Self::FullyContained => "fully_contained",
        }
    }
}

/// Overall outcome of a `kill_agent` request, summarizing both layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainmentOutcome {
    /// Process and network layers both succeeded.
    Full,
    /// Exactly one layer succeeded.
    Partial,
    /// Neither layer succeeded.
    Failed,
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

/// Derived risk posture of one agent, from its recent breach record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No recent breaches and all counts well under their limits.
    Low,
    /// At least one recent breach, or a count past half its limit.
    Medium,
    /// Repeated breaches, or a count near its limit.
    High,
    /// Breaching continuously; containment is likely warranted.
    Critical,
}
