//! Short-window exfiltration detection.
//!
//! Complements the per-type thresholds: an agent can pace each action type
//! below its limit while still moving a large volume of data, or touching an
//! unusual number of distinct targets. The [`ExfiltrationMonitor`] accumulates
//! (timestamp, bytes, target) per agent over one short window and reports a
//! finding when either the byte total or the distinct-target count exceeds
//! its cap.
//!
//! Only data-bearing actions should be recorded here; callers gate with
//! [`is_data_bearing`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use warden_types::{AgentId, action_types};

use crate::config::ExfiltrationConfig;

/// Action types that can carry data out of the system.
const DATA_BEARING: [&str; 3] = [
    action_types::FILE_READ,
    action_types::DB_QUERY,
    action_types::NETWORK_REQUEST,
];

/// Whether an action should be recorded by the exfiltration monitor.
#[must_use]
pub fn is_data_bearing(action_type: &str, data_size: u64) -> bool {
    data_size > 0 && DATA_BEARING.contains(&action_type)
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Thread-safe per-agent volume and fan-out accumulator.
pub struct ExfiltrationMonitor {
    /// Sliding window length in seconds.
    window_seconds: u64,
    /// Windowed byte volume above which an access is exfiltration.
    max_bytes: u64,
    /// Windowed distinct-target count above which an access is exfiltration.
    max_targets: usize,
    /// Per-agent access buffers.
    inner: Mutex<BTreeMap<AgentId, Vec<AccessEvent>>>,
}

/// One recorded data access.
#[derive(Debug, Clone)]
struct AccessEvent {
    at: DateTime<Utc>,
    bytes: u64,
    target: String,
}

/// Windowed view returned by [`ExfiltrationMonitor::agent_stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExfiltrationStats {
    /// The inspected agent.
    pub agent_id: AgentId,
    /// Accesses currently inside the window.
    pub access_count: u32,
    /// Byte total currently inside the window.
    pub total_bytes: u64,
    /// `total_bytes` in MiB, rounded to two decimals.
    pub total_mib: f64,
    /// Distinct targets currently inside the window.
    pub distinct_targets: u32,
    /// The window length in seconds.
    pub window_seconds: u64,
}

impl ExfiltrationMonitor {
    /// Create a monitor from the loaded configuration section.
    pub fn new(config: &ExfiltrationConfig) -> Self {
        Self {
            window_seconds: config.window_seconds,
            max_bytes: config.max_bytes,
            max_targets: config.max_targets,
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a data access as of now and test both caps.
    ///
    /// Returns the finding when the access tips either cap. The access that
    /// crosses a cap is itself counted, so a single oversized transfer is
    /// caught on its own.
    pub fn record_access(&self, agent_id: &AgentId, target: &str, bytes: u64) -> Option<String> {
        self.record_access_at(agent_id, target, bytes, Utc::now())
    }

    /// Record a data access as of an explicit instant.
    pub fn record_access_at(
        &self,
        agent_id: &AgentId,
        target: &str,
        bytes: u64,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let Ok(mut inner) = self.inner.lock() else {
            // The threshold engine ahead of this check fails closed on its
            // own lock fault, so a miss here never skips the whole pipeline.
            error!("exfiltration monitor lock poisoned, skipping check");
            return None;
        };

        let buffer = inner.entry(agent_id.clone()).or_default();
        buffer.push(AccessEvent {
            at: now,
            bytes,
            target: target.to_owned(),
        });

        let cutoff = subtract_seconds(now, self.window_seconds);
        buffer.retain(|event| event.at > cutoff);

        let total_bytes = buffer
            .iter()
            .fold(0_u64, |sum, event| sum.saturating_add(event.bytes));
        if total_bytes > self.max_bytes {
            return Some(format!(
                "{total_bytes} bytes in {}s exceeds {} byte cap",
                self.window_seconds, self.max_bytes
            ));
        }

        let distinct = buffer
            .iter()
            .map(|event| event.target.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        if distinct > self.max_targets {
            return Some(format!(
                "{distinct} distinct targets in {}s exceeds cap of {}",
                self.window_seconds, self.max_targets
            ));
        }

        None
    }

    /// Windowed access count, byte total, and distinct targets, as of now.
    pub fn agent_stats(&self, agent_id: &AgentId) -> ExfiltrationStats {
        self.agent_stats_at(agent_id, Utc::now())
    }

    /// Windowed stats as of an explicit instant.
    pub fn agent_stats_at(&self, agent_id: &AgentId, now: DateTime<Utc>) -> ExfiltrationStats {
        let empty = ExfiltrationStats {
            agent_id: agent_id.clone(),
            access_count: 0,
            total_bytes: 0,
            total_mib: 0.0,
            distinct_targets: 0,
            window_seconds: self.window_seconds,
        };
        let Ok(mut inner) = self.inner.lock() else {
            return empty;
        };
        let Some(buffer) = inner.get_mut(agent_id) else {
            return empty;
        };

        let cutoff = subtract_seconds(now, self.window_seconds);
        buffer.retain(|event| event.at > cutoff);

        let total_bytes = buffer
            .iter()
            .fold(0_u64, |sum, event| sum.saturating_add(event.bytes));
        let distinct = buffer
            .iter()
            .map(|event| event.target.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        ExfiltrationStats {
            agent_id: agent_id.clone(),
            access_count: u32::try_from(buffer.len()).unwrap_or(u32::MAX),
            total_bytes,
            total_mib: to_mib(total_bytes),
            distinct_targets: u32::try_from(distinct).unwrap_or(u32::MAX),
            window_seconds: self.window_seconds,
        }
    }

    /// Drop all recorded accesses for an agent.
    pub fn reset_agent(&self, agent_id: &AgentId) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.remove(agent_id).is_some() {
            info!(agent_id = %agent_id, "reset exfiltration history");
        }
    }

    /// Drop agents whose newest access is older than the window, as of now.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Utc::now())
    }

    /// Idle pruning as of an explicit instant.
    pub fn prune_idle_at(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let cutoff = subtract_seconds(now, self.window_seconds);
        let before = inner.len();
        inner.retain(|_, buffer| buffer.iter().any(|event| event.at > cutoff));
        before.saturating_sub(inner.len())
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_mib(bytes: u64) -> f64 {
    let mib = bytes as f64 / (1024.0 * 1024.0);
    (mib * 100.0).round() / 100.0
}

fn subtract_seconds(instant: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    let delta = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
    instant.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
