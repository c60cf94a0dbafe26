//! Per-agent action-rate thresholds.
//!
//! Provides a thread-safe [`ThresholdEngine`] that keeps, per
//! (agent, action type), an append-only timestamp buffer pruned to the
//! configured window on every check. An attempt is counted against the
//! limit including itself: with `max_count = N`, the first `N-1` attempts
//! inside the window are allowed and the `N`th is blocked, producing a
//! [`ThresholdBreach`] and starting a cooldown that blocks the pair
//! unconditionally until it expires.
//!
//! Evaluation takes an explicit `now` internally so tests never sleep;
//! the public methods pass `Utc::now()`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_types::{
    AgentId, RiskLevel, ThresholdAction, ThresholdBreach, ThresholdConfig, action_types,
};

/// `threshold_name` carried by the synthetic breach a cooldown block returns.
pub const COOLDOWN_THRESHOLD: &str = "Cooldown Active";

/// Maximum breach records kept in the engine's audit log.
const MAX_BREACH_LOG: usize = 500;

/// How far back the per-agent risk derivation looks in the audit log.
const RISK_SCAN_DEPTH: usize = 100;

/// How many of an agent's breaches the status snapshot carries.
const AGENT_BREACH_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Thread-safe action-rate threshold engine.
///
/// Safe to share via `Arc<ThresholdEngine>`. All mutable state lives behind
/// one internal mutex; a poisoned lock fails closed (the check blocks) so a
/// local fault can never wave an action through.
pub struct ThresholdEngine {
    /// Mutable interior state protected by a mutex.
    inner: Mutex<EngineInner>,
}

/// Mutable state held inside the mutex.
#[derive(Debug, Default)]
struct EngineInner {
    /// Active thresholds, keyed by action type.
    thresholds: BTreeMap<String, ThresholdConfig>,
    /// Per-agent, per-action-type timestamp buffers. Pruned on every count.
    history: BTreeMap<AgentId, BTreeMap<String, Vec<DateTime<Utc>>>>,
    /// Per-agent cooldown expiry instants, keyed by action type.
    cooldowns: BTreeMap<AgentId, BTreeMap<String, DateTime<Utc>>>,
    /// Breach audit log, newest first, capped at [`MAX_BREACH_LOG`].
    breach_log: Vec<ThresholdBreach>,
    /// Global counters.
    stats: StatsInner,
}

/// Global counters held inside the mutex.
#[derive(Debug, Default)]
struct StatsInner {
    total_checks: u64,
    total_allowed: u64,
    total_blocked: u64,
    total_kills: u64,
    breaches_by_type: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Windowed count for one configured action type, as of one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTypeStatus {
    /// Events currently inside the window.
    pub count: u32,
    /// The configured limit.
    pub limit: u32,
    /// The configured window in seconds.
    pub window_seconds: u64,
    /// `count` as a percentage of `limit`, rounded to one decimal.
    pub percentage: f64,
}

/// Per-agent view returned by [`ThresholdEngine::agent_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentThresholdStatus {
    /// The inspected agent.
    pub agent_id: AgentId,
    /// Windowed counts for every configured action type.
    pub action_counts: BTreeMap<String, ActionTypeStatus>,
    /// Active cooldowns: action type to remaining seconds (one decimal).
    pub cooldowns: BTreeMap<String, f64>,
    /// The agent's most recent breaches, newest first.
    pub recent_breaches: Vec<ThresholdBreach>,
    /// Risk posture derived from breaches and window pressure.
    pub risk_level: RiskLevel,
}

/// Global counters returned by [`ThresholdEngine::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStats {
    /// Checks evaluated, including cooldown blocks.
    pub total_checks: u64,
    /// Checks that were allowed.
    pub total_allowed: u64,
    /// Checks that were blocked, including cooldown blocks.
    pub total_blocked: u64,
    /// Breaches that requested containment.
    pub total_kills: u64,
    /// Blocked checks as a percentage of all checks, rounded to one decimal.
    pub block_rate: f64,
    /// Breach counts per action type (cooldown blocks are not breaches).
    pub breaches_by_type: BTreeMap<String, u64>,
    /// Agents with at least one tracked action.
    pub active_agents: usize,
    /// Breach records currently in the audit log.
    pub total_breaches: usize,
}

impl ThresholdEngine {
    /// Create an engine with the given thresholds.
    ///
    /// Rows are keyed by action type; a later row for the same type replaces
    /// the earlier one. An empty list restricts nothing.
    pub fn new(thresholds: Vec<ThresholdConfig>) -> Self {
        let map = thresholds
            .into_iter()
            .map(|t| (t.action_type.clone(), t))
            .collect();
        Self {
            inner: Mutex::new(EngineInner {
                thresholds: map,
                ..EngineInner::default()
            }),
        }
    }

    /// Create an engine with the built-in default table.
    pub fn with_defaults() -> Self {
        Self::new(default_thresholds())
    }

    /// Check whether an action is allowed, as of now.
    ///
    /// Returns `(allowed, breach)`: a blocked action always carries the
    /// breach that blocked it (a synthetic `"Cooldown Active"` record when
    /// the block came from a cooldown rather than a fresh count).
    pub fn check_action(
        &self,
        agent_id: &AgentId,
        action_type: &str,
        target: &str,
    ) -> (bool, Option<ThresholdBreach>) {
        self.check_action_at(agent_id, action_type, target, Utc::now())
    }

    /// Check whether an action is allowed, as of an explicit instant.
    pub fn check_action_at(
        &self,
        agent_id: &AgentId,
        action_type: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> (bool, Option<ThresholdBreach>) {
        // A poisoned lock fails closed: blocking is always the safe answer.
        let Ok(mut inner) = self.inner.lock() else {
            error!("threshold engine lock poisoned, failing closed");
            return (false, None);
        };

        inner.stats.total_checks = inner.stats.total_checks.saturating_add(1);

        // Cooldown blocks the pair unconditionally until expiry; no count
        // is consulted and nothing is appended to the audit log.
        if inner.in_cooldown(agent_id, action_type, now) {
            inner.stats.total_blocked = inner.stats.total_blocked.saturating_add(1);
            let breach = ThresholdBreach {
                id: Uuid::now_v7(),
                agent_id: agent_id.clone(),
                threshold_name: COOLDOWN_THRESHOLD.to_owned(),
                action_type: action_type.to_owned(),
                count: 0,
                limit: 0,
                window_seconds: 0,
                breach_action: ThresholdAction::Block,
                should_kill: false,
                timestamp: now,
            };
            return (false, Some(breach));
        }

        // Unconfigured action types are recorded and allowed.
        let Some(threshold) = inner.thresholds.get(action_type).cloned() else {
            inner.record(agent_id, action_type, now);
            inner.stats.total_allowed = inner.stats.total_allowed.saturating_add(1);
            return (true, None);
        };

        // Count the attempt against the window, including itself.
        let prior = inner.count_recent(agent_id, action_type, threshold.window_seconds, now);
        let count = saturating_u32(prior.saturating_add(1));

        if count >= threshold.max_count {
            let breach = inner.handle_breach(agent_id, &threshold, count, target, now);
            return (false, Some(breach));
        }

        inner.record(agent_id, action_type, now);
        inner.stats.total_allowed = inner.stats.total_allowed.saturating_add(1);
        (true, None)
    }

    /// Per-agent counts, cooldowns, recent breaches, and derived risk, as of now.
    pub fn agent_status(&self, agent_id: &AgentId) -> AgentThresholdStatus {
        self.agent_status_at(agent_id, Utc::now())
    }

    /// Per-agent status as of an explicit instant.
    pub fn agent_status_at(&self, agent_id: &AgentId, now: DateTime<Utc>) -> AgentThresholdStatus {
        let Ok(inner) = self.inner.lock() else {
            return AgentThresholdStatus {
                agent_id: agent_id.clone(),
                action_counts: BTreeMap::new(),
                cooldowns: BTreeMap::new(),
                recent_breaches: Vec::new(),
                risk_level: RiskLevel::Low,
            };
        };

        let mut action_counts = BTreeMap::new();
        for (action_type, threshold) in &inner.thresholds {
            let count = saturating_u32(inner.count_in_window(
                agent_id,
                action_type,
                threshold.window_seconds,
                now,
            ));
            action_counts.insert(
                action_type.clone(),
                ActionTypeStatus {
                    count,
                    limit: threshold.max_count,
                    window_seconds: threshold.window_seconds,
                    percentage: percent_of(count, threshold.max_count),
                },
            );
        }

        let mut cooldowns = BTreeMap::new();
        if let Some(agent_cooldowns) = inner.cooldowns.get(agent_id) {
            for (action_type, end) in agent_cooldowns {
                if *end > now {
                    let remaining = end
                        .signed_duration_since(now)
                        .to_std()
                        .map_or(0.0, |d| d.as_secs_f64());
                    cooldowns.insert(action_type.clone(), round_tenth(remaining));
                }
            }
        }

        // The agent's newest breaches among the most recent log entries.
        let recent_breaches: Vec<ThresholdBreach> = inner
            .breach_log
            .iter()
            .take(RISK_SCAN_DEPTH)
            .filter(|b| &b.agent_id == agent_id)
            .take(AGENT_BREACH_LIMIT)
            .cloned()
            .collect();

        let max_percentage = action_counts
            .values()
            .map(|a| a.percentage)
            .fold(0.0_f64, f64::max);
        let risk_level = derive_risk(recent_breaches.len(), max_percentage);

        AgentThresholdStatus {
            agent_id: agent_id.clone(),
            action_counts,
            cooldowns,
            recent_breaches,
            risk_level,
        }
    }

    /// Global counters. Zeroed if the lock is poisoned.
    pub fn stats(&self) -> ThresholdStats {
        let Ok(inner) = self.inner.lock() else {
            return ThresholdStats {
                total_checks: 0,
                total_allowed: 0,
                total_blocked: 0,
                total_kills: 0,
                block_rate: 0.0,
                breaches_by_type: BTreeMap::new(),
                active_agents: 0,
                total_breaches: 0,
            };
        };
        ThresholdStats {
            total_checks: inner.stats.total_checks,
            total_allowed: inner.stats.total_allowed,
            total_blocked: inner.stats.total_blocked,
            total_kills: inner.stats.total_kills,
            block_rate: ratio_percent(inner.stats.total_blocked, inner.stats.total_checks),
            breaches_by_type: inner.stats.breaches_by_type.clone(),
            active_agents: inner.history.len(),
            total_breaches: inner.breach_log.len(),
        }
    }

    /// Drop all history and cooldowns for an agent.
    pub fn reset_agent(&self, agent_id: &AgentId) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.history.remove(agent_id);
        inner.cooldowns.remove(agent_id);
        info!(agent_id = %agent_id, "reset threshold history");
    }

    /// Add a threshold at runtime, replacing any existing row for its type.
    pub fn add_threshold(&self, config: ThresholdConfig) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        info!(
            threshold = %config.name,
            action_type = %config.action_type,
            max_count = config.max_count,
            "threshold added"
        );
        inner.thresholds.insert(config.action_type.clone(), config);
    }

    /// Remove the threshold for an action type. Returns whether one existed.
    pub fn remove_threshold(&self, action_type: &str) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        let removed = inner.thresholds.remove(action_type).is_some();
        if removed {
            info!(action_type = %action_type, "threshold removed");
        }
        removed
    }

    /// The newest breach records, newest first.
    pub fn recent_breaches(&self, limit: usize) -> Vec<ThresholdBreach> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        inner.breach_log.iter().take(limit).cloned().collect()
    }

    /// Drop per-agent state for agents idle longer than `idle_seconds`.
    ///
    /// Returns how many agents were pruned. Expired cooldowns are swept at
    /// the same time.
    pub fn prune_idle(&self, idle_seconds: u64) -> usize {
        self.prune_idle_at(idle_seconds, Utc::now())
    }

    /// Idle pruning as of an explicit instant.
    pub fn prune_idle_at(&self, idle_seconds: u64, now: DateTime<Utc>) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let cutoff = subtract_seconds(now, idle_seconds);

        let before = inner.history.len();
        inner.history.retain(|_, buffers| {
            buffers
                .values()
                .any(|buffer| buffer.iter().any(|ts| *ts > cutoff))
        });
        let pruned = before.saturating_sub(inner.history.len());

        inner.cooldowns.retain(|_, per_type| {
            per_type.retain(|_, end| *end > now);
            !per_type.is_empty()
        });

        if pruned > 0 {
            info!(pruned, idle_seconds, "pruned idle threshold state");
        }
        pruned
    }
}

impl EngineInner {
    fn in_cooldown(&self, agent_id: &AgentId, action_type: &str, now: DateTime<Utc>) -> bool {
        self.cooldowns
            .get(agent_id)
            .and_then(|per_type| per_type.get(action_type))
            .is_some_and(|end| now < *end)
    }

    /// Prune the buffer to the window and return the surviving count.
    fn count_recent(
        &mut self,
        agent_id: &AgentId,
        action_type: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> usize {
        let cutoff = subtract_seconds(now, window_seconds);
        let Some(buffer) = self
            .history
            .get_mut(agent_id)
            .and_then(|buffers| buffers.get_mut(action_type))
        else {
            return 0;
        };
        buffer.retain(|ts| *ts > cutoff);
        buffer.len()
    }

    /// Count buffer entries inside the window without pruning.
    fn count_in_window(
        &self,
        agent_id: &AgentId,
        action_type: &str,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> usize {
        let cutoff = subtract_seconds(now, window_seconds);
        self.history
            .get(agent_id)
            .and_then(|buffers| buffers.get(action_type))
            .map_or(0, |buffer| {
                buffer.iter().filter(|ts| **ts > cutoff).count()
            })
    }

    fn record(&mut self, agent_id: &AgentId, action_type: &str, now: DateTime<Utc>) {
        self.history
            .entry(agent_id.clone())
            .or_default()
            .entry(action_type.to_owned())
            .or_default()
            .push(now);
    }

    fn handle_breach(
        &mut self,
        agent_id: &AgentId,
        threshold: &ThresholdConfig,
        count: u32,
        target: &str,
        now: DateTime<Utc>,
    ) -> ThresholdBreach {
        let kill_threshold = f64::from(threshold.max_count) * threshold.kill_multiplier;
        let should_kill =
            f64::from(count) >= kill_threshold || threshold.breach_action == ThresholdAction::Kill;

        let breach = ThresholdBreach {
            id: Uuid::now_v7(),
            agent_id: agent_id.clone(),
            threshold_name: threshold.name.clone(),
            action_type: threshold.action_type.clone(),
            count,
            limit: threshold.max_count,
            window_seconds: threshold.window_seconds,
            breach_action: threshold.breach_action,
            should_kill,
            timestamp: now,
        };

        self.stats.total_blocked = self.stats.total_blocked.saturating_add(1);
        let by_type = self
            .stats
            .breaches_by_type
            .entry(threshold.action_type.clone())
            .or_insert(0);
        *by_type = by_type.saturating_add(1);

        self.breach_log.insert(0, breach.clone());
        if self.breach_log.len() > MAX_BREACH_LOG {
            self.breach_log.truncate(MAX_BREACH_LOG);
        }

        // The breached attempt is not recorded; the cooldown blocks the
        // pair regardless of what remains in the window.
        self.cooldowns
            .entry(agent_id.clone())
            .or_default()
            .insert(
                threshold.action_type.clone(),
                add_seconds(now, threshold.cooldown_seconds),
            );

        if should_kill {
            self.stats.total_kills = self.stats.total_kills.saturating_add(1);
            error!(
                agent_id = %agent_id,
                threshold = %threshold.name,
                action_type = %threshold.action_type,
                target = %target,
                count,
                limit = threshold.max_count,
                "kill threshold exceeded"
            );
        } else {
            warn!(
                agent_id = %agent_id,
                threshold = %threshold.name,
                action_type = %threshold.action_type,
                target = %target,
                count,
                limit = threshold.max_count,
                "threshold breached"
            );
        }

        breach
    }
}

// ---------------------------------------------------------------------------
// Default Threshold Table
// ---------------------------------------------------------------------------

/// The built-in threshold table, loaded when the config file names none.
#[allow(clippy::too_many_lines)]
pub fn default_thresholds() -> Vec<ThresholdConfig> {
    fn row(
        name: &str,
        action_type: &str,
        max_count: u32,
        window_seconds: u64,
        breach_action: ThresholdAction,
        kill_multiplier: f64,
    ) -> ThresholdConfig {
        ThresholdConfig {
            name: name.to_owned(),
            action_type: action_type.to_owned(),
            max_count,
            window_seconds,
            breach_action,
            cooldown_seconds: 60,
            kill_multiplier,
        }
    }

    vec![
        row("Rapid File Access", action_types::FILE_READ, 100, 60, ThresholdAction::Block, 2.0),
        row("Mass File Write", action_types::FILE_WRITE, 50, 60, ThresholdAction::Block, 1.5),
        row("Mass File Deletion", action_types::FILE_DELETE, 10, 60, ThresholdAction::Kill, 1.0),
        row("Network Flood", action_types::NETWORK_REQUEST, 50, 60, ThresholdAction::Throttle, 3.0),
        row("External API Abuse", action_types::EXTERNAL_API, 30, 60, ThresholdAction::Block, 2.0),
        row("Data Upload Spike", action_types::DATA_UPLOAD, 10, 60, ThresholdAction::Kill, 1.0),
        row("Shell Command Abuse", action_types::SHELL_EXEC, 10, 300, ThresholdAction::Kill, 1.0),
        row("Process Spawn Limit", action_types::PROCESS_SPAWN, 5, 60, ThresholdAction::Block, 1.5),
        row("Database Query Flood", action_types::DB_QUERY, 200, 60, ThresholdAction::Throttle, 3.0),
        row("Mass Data Export", action_types::DB_WRITE, 50, 60, ThresholdAction::Block, 2.0),
        row("Transaction Limit", action_types::TRANSACTION, 20, 3_600, ThresholdAction::Block, 2.0),
        row("High Value Transaction", action_types::HIGH_VALUE_TX, 5, 3_600, ThresholdAction::Kill, 1.0),
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// CRITICAL above five recent breaches; HIGH above two breaches or 80% of a
/// limit; MEDIUM above zero breaches or 50%; LOW otherwise.
fn derive_risk(recent_breaches: usize, max_percentage: f64) -> RiskLevel {
    if recent_breaches > 5 {
        RiskLevel::Critical
    } else if recent_breaches > 2 || max_percentage > 80.0 {
        RiskLevel::High
    } else if recent_breaches > 0 || max_percentage > 50.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn percent_of(count: u32, limit: u32) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    round_tenth(f64::from(count) / f64::from(limit) * 100.0)
}

#[allow(clippy::cast_precision_loss)]
fn ratio_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_tenth(part as f64 / whole as f64 * 100.0)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn add_seconds(instant: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    let delta = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
    instant.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn subtract_seconds(instant: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    let delta = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
    instant.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000_i64.saturating_add(secs), 0).unwrap()
    }

    fn agent(name: &str) -> AgentId {
        AgentId::new(name)
    }

    fn single_threshold(max_count: u32, action: ThresholdAction, multiplier: f64) -> ThresholdEngine {
        ThresholdEngine::new(vec![ThresholdConfig {
            name: "Test Limit".to_owned(),
            action_type: "file_read".to_owned(),
            max_count,
            window_seconds: 60,
            breach_action: action,
            cooldown_seconds: 60,
            kill_multiplier: multiplier,
        }])
    }

    #[test]
    fn nth_attempt_is_blocked() {
        let engine = single_threshold(5, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        for i in 0..4 {
            let (allowed, breach) = engine.check_action_at(&id, "file_read", "/tmp/x", t(i));
            assert!(allowed, "attempt {} should be allowed", i.saturating_add(1));
            assert!(breach.is_none());
        }
        let (allowed, breach) = engine.check_action_at(&id, "file_read", "/tmp/x", t(4));
        assert!(!allowed);
        let breach = breach.unwrap();
        assert_eq!(breach.threshold_name, "Test Limit");
        assert_eq!(breach.count, 5);
        assert_eq!(breach.limit, 5);
        assert!(!breach.should_kill);
    }

    #[test]
    fn window_expiry_frees_the_count() {
        let engine = single_threshold(3, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        assert!(engine.check_action_at(&id, "file_read", "", t(0)).0);
        assert!(engine.check_action_at(&id, "file_read", "", t(1)).0);
        let (allowed, _) = engine.check_action_at(&id, "file_read", "", t(2));
        assert!(!allowed);
        // Cooldown (60s) has expired and both recorded events fell out of
        // the 60s window, so the count starts over.
        let (allowed, breach) = engine.check_action_at(&id, "file_read", "", t(63));
        assert!(allowed, "got breach: {breach:?}");
    }

    #[test]
    fn cooldown_blocks_even_when_count_would_permit() {
        let engine = single_threshold(3, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        engine.check_action_at(&id, "file_read", "", t(0));
        engine.check_action_at(&id, "file_read", "", t(1));
        engine.check_action_at(&id, "file_read", "", t(2)); // breach, cooldown until t(62)
        let (allowed, breach) = engine.check_action_at(&id, "file_read", "", t(30));
        assert!(!allowed);
        let breach = breach.unwrap();
        assert_eq!(breach.threshold_name, COOLDOWN_THRESHOLD);
        assert_eq!(breach.count, 0);
        assert_eq!(breach.limit, 0);
        assert_eq!(breach.window_seconds, 0);
        assert_eq!(breach.breach_action, ThresholdAction::Block);
        assert!(!breach.should_kill);
        // Cooldown blocks do not enter the audit log.
        assert_eq!(engine.recent_breaches(10).len(), 1);
    }

    #[test]
    fn kill_multiplier_reached_on_the_expected_attempt() {
        let engine = single_threshold(10, ThresholdAction::Block, 1.0);
        let id = agent("a1");
        for i in 0..9 {
            assert!(engine.check_action_at(&id, "file_read", "", t(i)).0);
        }
        let (allowed, breach) = engine.check_action_at(&id, "file_read", "", t(9));
        assert!(!allowed);
        let breach = breach.unwrap();
        assert_eq!(breach.count, 10);
        assert!(breach.should_kill, "multiplier 1.0 kills at max_count");
    }

    #[test]
    fn kill_action_always_requests_kill() {
        let engine = single_threshold(3, ThresholdAction::Kill, 5.0);
        let id = agent("a1");
        engine.check_action_at(&id, "file_read", "", t(0));
        engine.check_action_at(&id, "file_read", "", t(1));
        let (_, breach) = engine.check_action_at(&id, "file_read", "", t(2));
        assert!(breach.unwrap().should_kill);
    }

    #[test]
    fn unconfigured_action_types_are_recorded_and_allowed() {
        let engine = single_threshold(3, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        for i in 0..50 {
            let (allowed, breach) = engine.check_action_at(&id, "telemetry_ping", "", t(i));
            assert!(allowed);
            assert!(breach.is_none());
        }
        let stats = engine.stats();
        assert_eq!(stats.total_allowed, 50);
        assert_eq!(stats.active_agents, 1);
    }

    #[test]
    fn stats_track_block_rate() {
        let engine = single_threshold(2, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        engine.check_action_at(&id, "file_read", "", t(0)); // allowed
        engine.check_action_at(&id, "file_read", "", t(1)); // breach
        engine.check_action_at(&id, "file_read", "", t(2)); // cooldown block
        let stats = engine.stats();
        assert_eq!(stats.total_checks, 3);
        assert_eq!(stats.total_allowed, 1);
        assert_eq!(stats.total_blocked, 2);
        assert!((stats.block_rate - 66.7).abs() < 0.01);
        assert_eq!(stats.breaches_by_type.get("file_read"), Some(&1));
        assert_eq!(stats.total_breaches, 1);
    }

    #[test]
    fn agent_status_reports_counts_and_cooldowns() {
        let engine = single_threshold(10, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        for i in 0..6 {
            engine.check_action_at(&id, "file_read", "", t(i));
        }
        let status = engine.agent_status_at(&id, t(6));
        let counts = status.action_counts.get("file_read").unwrap();
        assert_eq!(counts.count, 6);
        assert_eq!(counts.limit, 10);
        assert!((counts.percentage - 60.0).abs() < f64::EPSILON);
        assert!(status.cooldowns.is_empty());
        // 60% of the limit with no breaches is MEDIUM.
        assert_eq!(status.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn agent_status_shows_cooldown_remaining() {
        let engine = single_threshold(2, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        engine.check_action_at(&id, "file_read", "", t(0));
        engine.check_action_at(&id, "file_read", "", t(1)); // breach, cooldown until t(61)
        let status = engine.agent_status_at(&id, t(31));
        let remaining = status.cooldowns.get("file_read").copied().unwrap();
        assert!((remaining - 30.0).abs() < 0.2, "remaining was {remaining}");
        assert_eq!(status.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn risk_escalates_with_breach_count() {
        let engine = single_threshold(1, ThresholdAction::Block, 100.0);
        let id = agent("a1");
        // Every attempt breaches (max_count 1 blocks the first attempt);
        // space attempts past the 60s cooldown so each one is a fresh breach.
        for i in 0..6_i64 {
            engine.check_action_at(&id, "file_read", "", t(i.saturating_mul(61)));
        }
        let status = engine.agent_status_at(&id, t(6 * 61));
        assert_eq!(status.recent_breaches.len(), 6);
        assert_eq!(status.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn reset_agent_clears_history_and_cooldowns() {
        let engine = single_threshold(2, ThresholdAction::Block, 2.0);
        let id = agent("a1");
        engine.check_action_at(&id, "file_read", "", t(0));
        engine.check_action_at(&id, "file_read", "", t(1)); // breach + cooldown
        engine.reset_agent(&id);
        let (allowed, _) = engine.check_action_at(&id, "file_read", "", t(2));
        assert!(allowed, "reset clears the cooldown");
    }

    #[test]
    fn thresholds_can_change_at_runtime() {
        let engine = ThresholdEngine::new(Vec::new());
        let id = agent("a1");
        assert!(engine.check_action_at(&id, "shell_exec", "", t(0)).0);

        engine.add_threshold(ThresholdConfig {
            name: "Shell Lockdown".to_owned(),
            action_type: "shell_exec".to_owned(),
            max_count: 1,
            window_seconds: 60,
            breach_action: ThresholdAction::Kill,
            cooldown_seconds: 60,
            kill_multiplier: 1.0,
        });
        let (allowed, breach) = engine.check_action_at(&id, "shell_exec", "", t(1));
        assert!(!allowed);
        assert!(breach.unwrap().should_kill);

        assert!(engine.remove_threshold("shell_exec"));
        assert!(!engine.remove_threshold("shell_exec"));
    }

    #[test]
    fn recent_breaches_are_newest_first() {
        let engine = single_threshold(1, ThresholdAction::Block, 100.0);
        engine.check_action_at(&agent("a1"), "file_read", "", t(0));
        engine.check_action_at(&agent("a2"), "file_read", "", t(61));
        let breaches = engine.recent_breaches(10);
        assert_eq!(breaches.len(), 2);
        assert_eq!(breaches.first().map(|b| b.agent_id.as_str()), Some("a2"));
        assert_eq!(engine.recent_breaches(1).len(), 1);
    }

    #[test]
    fn prune_idle_drops_stale_agents() {
        let engine = single_threshold(100, ThresholdAction::Block, 2.0);
        engine.check_action_at(&agent("stale"), "file_read", "", t(0));
        engine.check_action_at(&agent("fresh"), "file_read", "", t(4_000));
        let pruned = engine.prune_idle_at(3_600, t(4_100));
        assert_eq!(pruned, 1);
        assert_eq!(engine.stats().active_agents, 1);
    }

    #[test]
    fn default_table_covers_the_known_action_types() {
        let table = default_thresholds();
        assert_eq!(table.len(), 12);
        assert!(table.iter().all(|t| t.cooldown_seconds == 60));
        let deletion = table
            .iter()
            .find(|t| t.action_type == action_types::FILE_DELETE)
            .unwrap();
        assert_eq!(deletion.breach_action, ThresholdAction::Kill);
        assert_eq!(deletion.max_count, 10);
    }

    #[test]
    fn concurrent_checks_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(single_threshold(10_000, ThresholdAction::Block, 2.0));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                let id = agent(&format!("worker-{worker}"));
                for i in 0..100 {
                    engine.check_action_at(&id, "file_read", "", t(i));
                }
            }));
        }
        for handle in handles {
            handle.join().ok();
        }
        assert_eq!(engine.stats().total_checks, 800);
    }
}
