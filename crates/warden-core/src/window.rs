//! Multi-horizon sliding accumulators.
//!
//! Per-minute thresholds cannot catch activity deliberately paced below
//! them: one record every thirty seconds clears any per-minute limit and
//! still reads thousands of records in a day. Each [`WindowDetector`] keeps,
//! per metric, three independent accumulators over 1 h, 6 h, and 24 h
//! horizons and compares their running totals against configured limits.
//!
//! An accumulator is a deque of (timestamp, value) plus a running total, so
//! recording is O(1) amortized and pruning pays only for what actually
//! expired. Events exactly at the window cutoff remain counted.
//!
//! [`WindowMonitor`] owns one detector per agent and is safe to share.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_types::{
    AgentId, WindowAction, WindowBreach, WindowMetric, WindowMetricThreshold, WindowSpan,
};

/// The built-in window threshold table, loaded when the config names none.
pub fn default_window_thresholds() -> Vec<WindowMetricThreshold> {
    const fn row(
        metric: WindowMetric,
        span: WindowSpan,
        limit: u64,
        action: WindowAction,
    ) -> WindowMetricThreshold {
        WindowMetricThreshold {
            metric,
            span,
            limit,
            action,
        }
    }

    vec![
        row(WindowMetric::BytesOut, WindowSpan::Hour1, 10_000_000, WindowAction::Alert),
        row(WindowMetric::BytesOut, WindowSpan::Hour24, 50_000_000, WindowAction::Kill),
        row(WindowMetric::RecordsAccessed, WindowSpan::Hour1, 1_000, WindowAction::Alert),
        row(WindowMetric::RecordsAccessed, WindowSpan::Hour24, 10_000, WindowAction::Kill),
        row(WindowMetric::ApiCalls, WindowSpan::Hour1, 500, WindowAction::Alert),
        row(WindowMetric::FilesRead, WindowSpan::Hour24, 1_000, WindowAction::Alert),
        row(WindowMetric::Connections, WindowSpan::Hour1, 100, WindowAction::Alert),
    ]
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// One sliding window over one metric.
#[derive(Debug)]
struct Accumulator {
    span: WindowSpan,
    events: VecDeque<(DateTime<Utc>, u64)>,
    total: u64,
}

impl Accumulator {
    const fn new(span: WindowSpan) -> Self {
        Self {
            span,
            events: VecDeque::new(),
            total: 0,
        }
    }

    fn add(&mut self, value: u64, now: DateTime<Utc>) {
        self.events.push_back((now, value));
        self.total = self.total.saturating_add(value);
        self.prune(now);
    }

    /// Drop expired events from the front. Events exactly at the cutoff stay.
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now
            .checked_sub_signed(Duration::seconds(self.span.seconds()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        while let Some((ts, value)) = self.events.front().copied() {
            if ts >= cutoff {
                break;
            }
            self.events.pop_front();
            self.total = self.total.saturating_sub(value);
        }
    }

    fn total_at(&mut self, now: DateTime<Utc>) -> u64 {
        self.prune(now);
        self.total
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Multi-window accumulators and thresholds for one agent.
///
/// Methods take `&mut self` since reads prune; share a fleet of detectors
/// through [`WindowMonitor`].
#[derive(Debug)]
pub struct WindowDetector {
    agent_id: AgentId,
    thresholds: Vec<WindowMetricThreshold>,
    lanes: BTreeMap<WindowMetric, Vec<Accumulator>>,
    breach_count: u64,
}

/// Summary returned by [`WindowDetector::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStatus {
    /// The observed agent.
    pub agent_id: AgentId,
    /// Breaches emitted since the detector was created.
    pub breach_count: u64,
    /// Current running totals, keyed `"<metric>_<span>"` (`"bytes_out_1h"`).
    pub totals: BTreeMap<String, u64>,
    /// Number of configured threshold rows.
    pub threshold_count: usize,
}

/// Fleet-wide summary returned by [`WindowMonitor::fleet_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetWindowStatus {
    /// Registered agents.
    pub total_agents: usize,
    /// Per-agent detector summaries.
    pub agents: BTreeMap<AgentId, DetectorStatus>,
}

impl WindowDetector {
    /// Create a detector with the given threshold rows.
    pub fn new(agent_id: AgentId, thresholds: Vec<WindowMetricThreshold>) -> Self {
        let lanes = WindowMetric::ALL
            .into_iter()
            .map(|metric| {
                let accumulators = WindowSpan::ALL.into_iter().map(Accumulator::new).collect();
                (metric, accumulators)
            })
            .collect();
        Self {
            agent_id,
            thresholds,
            lanes,
            breach_count: 0,
        }
    }

    /// Record a value into all three horizons of a metric, as of now.
    pub fn record(&mut self, metric: WindowMetric, value: u64) {
        self.record_at(metric, value, Utc::now());
    }

    /// Record as of an explicit instant.
    pub fn record_at(&mut self, metric: WindowMetric, value: u64, now: DateTime<Utc>) {
        if let Some(lane) = self.lanes.get_mut(&metric) {
            for accumulator in lane {
                accumulator.add(value, now);
            }
        }
    }

    /// Compare every configured (metric, span) total against its limit.
    ///
    /// Emits one breach per row whose total is strictly greater than the
    /// limit, as of now.
    pub fn check_thresholds(&mut self) -> Vec<WindowBreach> {
        self.check_thresholds_at(Utc::now())
    }

    /// Threshold evaluation as of an explicit instant.
    pub fn check_thresholds_at(&mut self, now: DateTime<Utc>) -> Vec<WindowBreach> {
        let mut breaches = Vec::new();
        for threshold in &self.thresholds {
            let Some(accumulator) = self
                .lanes
                .get_mut(&threshold.metric)
                .and_then(|lane| lane.iter_mut().find(|a| a.span == threshold.span))
            else {
                continue;
            };
            let observed = accumulator.total_at(now);
            if observed > threshold.limit {
                warn!(
                    agent_id = %self.agent_id,
                    metric = threshold.metric.label(),
                    span = threshold.span.label(),
                    observed,
                    limit = threshold.limit,
                    action = ?threshold.action,
                    "window threshold breached"
                );
                breaches.push(WindowBreach {
                    id: Uuid::now_v7(),
                    agent_id: self.agent_id.clone(),
                    metric: threshold.metric,
                    span: threshold.span,
                    observed,
                    limit: threshold.limit,
                    action: threshold.action,
                    timestamp: now,
                });
                self.breach_count = self.breach_count.saturating_add(1);
            }
        }
        breaches
    }

    /// Whether any current breach is kill-tagged, as of now.
    pub fn should_kill(&mut self) -> bool {
        self.should_kill_at(Utc::now())
    }

    /// Kill evaluation as of an explicit instant.
    pub fn should_kill_at(&mut self, now: DateTime<Utc>) -> bool {
        self.check_thresholds_at(now)
            .iter()
            .any(|b| b.action == WindowAction::Kill)
    }

    /// Every (metric, span) running total, as of now.
    pub fn current_totals(&mut self) -> BTreeMap<String, u64> {
        self.current_totals_at(Utc::now())
    }

    /// Running totals as of an explicit instant.
    pub fn current_totals_at(&mut self, now: DateTime<Utc>) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for (metric, lane) in &mut self.lanes {
            for accumulator in lane {
                totals.insert(
                    format!("{}_{}", metric.label(), accumulator.span.label()),
                    accumulator.total_at(now),
                );
            }
        }
        totals
    }

    /// Summary of this detector, as of now.
    pub fn status(&mut self) -> DetectorStatus {
        self.status_at(Utc::now())
    }

    /// Summary as of an explicit instant.
    pub fn status_at(&mut self, now: DateTime<Utc>) -> DetectorStatus {
        DetectorStatus {
            agent_id: self.agent_id.clone(),
            breach_count: self.breach_count,
            totals: self.current_totals_at(now),
            threshold_count: self.thresholds.len(),
        }
    }

    /// Prune every lane and report whether any events remain, as of an
    /// explicit instant.
    pub fn holds_events_at(&mut self, now: DateTime<Utc>) -> bool {
        let mut held = false;
        for lane in self.lanes.values_mut() {
            for accumulator in lane {
                accumulator.prune(now);
                held = held || !accumulator.events.is_empty();
            }
        }
        held
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Thread-safe fleet of window detectors, one per agent.
pub struct WindowMonitor {
    /// Threshold rows applied to agents registered without a custom table.
    defaults: Vec<WindowMetricThreshold>,
    /// Registered detectors.
    inner: Mutex<BTreeMap<AgentId, WindowDetector>>,
}

impl WindowMonitor {
    /// Create a monitor whose auto-registrations use the given table.
    pub const fn new(defaults: Vec<WindowMetricThreshold>) -> Self {
        Self {
            defaults,
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a monitor using the built-in default table.
    pub fn with_defaults() -> Self {
        Self::new(default_window_thresholds())
    }

    /// Register an agent, with a custom threshold table or the default one.
    ///
    /// Re-registering replaces the agent's detector and drops its history.
    pub fn register(&self, agent_id: &AgentId, thresholds: Option<Vec<WindowMetricThreshold>>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let table = thresholds.unwrap_or_else(|| self.defaults.clone());
        info!(agent_id = %agent_id, thresholds = table.len(), "window detector registered");
        inner.insert(agent_id.clone(), WindowDetector::new(agent_id.clone(), table));
    }

    /// Remove an agent's detector. Returns whether one existed.
    pub fn unregister(&self, agent_id: &AgentId) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        inner.remove(agent_id).is_some()
    }

    /// Record a metric value for an agent, as of now.
    ///
    /// Unknown agents are registered on the fly with the default table, so
    /// a recording gap can never open between registration paths.
    pub fn record(&self, agent_id: &AgentId, metric: WindowMetric, value: u64) {
        self.record_at(agent_id, metric, value, Utc::now());
    }

    /// Record as of an explicit instant.
    pub fn record_at(
        &self,
        agent_id: &AgentId,
        metric: WindowMetric,
        value: u64,
        now: DateTime<Utc>,
    ) {
        let Ok(mut inner) = self.inner.lock() else {
            error!("window monitor lock poisoned, dropping record");
            return;
        };
        inner
            .entry(agent_id.clone())
            .or_insert_with(|| WindowDetector::new(agent_id.clone(), self.defaults.clone()))
            .record_at(metric, value, now);
    }

    /// Evaluate one agent's thresholds, as of now.
    pub fn check_agent(&self, agent_id: &AgentId) -> Vec<WindowBreach> {
        self.check_agent_at(agent_id, Utc::now())
    }

    /// Evaluation as of an explicit instant.
    pub fn check_agent_at(&self, agent_id: &AgentId, now: DateTime<Utc>) -> Vec<WindowBreach> {
        let Ok(mut inner) = self.inner.lock() else {
            error!("window monitor lock poisoned, skipping check");
            return Vec::new();
        };
        inner
            .get_mut(agent_id)
            .map(|detector| detector.check_thresholds_at(now))
            .unwrap_or_default()
    }

    /// Evaluate every registered agent, as of now.
    pub fn check_all(&self) -> BTreeMap<AgentId, Vec<WindowBreach>> {
        self.check_all_at(Utc::now())
    }

    /// Fleet evaluation as of an explicit instant.
    pub fn check_all_at(&self, now: DateTime<Utc>) -> BTreeMap<AgentId, Vec<WindowBreach>> {
        let Ok(mut inner) = self.inner.lock() else {
            error!("window monitor lock poisoned, skipping check");
            return BTreeMap::new();
        };
        inner
            .iter_mut()
            .map(|(agent_id, detector)| (agent_id.clone(), detector.check_thresholds_at(now)))
            .collect()
    }

    /// Per-agent summaries for the whole fleet, as of now.
    pub fn fleet_status(&self) -> FleetWindowStatus {
        self.fleet_status_at(Utc::now())
    }

    /// Fleet summary as of an explicit instant.
    pub fn fleet_status_at(&self, now: DateTime<Utc>) -> FleetWindowStatus {
        let Ok(mut inner) = self.inner.lock() else {
            return FleetWindowStatus {
                total_agents: 0,
                agents: BTreeMap::new(),
            };
        };
        let agents: BTreeMap<AgentId, DetectorStatus> = inner
            .iter_mut()
            .map(|(agent_id, detector)| (agent_id.clone(), detector.status_at(now)))
            .collect();
        FleetWindowStatus {
            total_agents: agents.len(),
            agents,
        }
    }

    /// One agent's summary, as of now. `None` for unknown agents.
    pub fn agent_status(&self, agent_id: &AgentId) -> Option<DetectorStatus> {
        self.agent_status_at(agent_id, Utc::now())
    }

    /// Agent summary as of an explicit instant.
    pub fn agent_status_at(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> Option<DetectorStatus> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        inner
            .get_mut(agent_id)
            .map(|detector| detector.status_at(now))
    }

    /// Drop detectors whose every window has drained, as of now.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Utc::now())
    }

    /// Idle prune as of an explicit instant. Returns detectors dropped.
    pub fn prune_idle_at(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            error!("window monitor lock poisoned, skipping prune");
            return 0;
        };
        let before = inner.len();
        inner.retain(|_, detector| detector.holds_events_at(now));
        before.saturating_sub(inner.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000_i64.saturating_add(secs), 0).unwrap()
    }

    fn one_row(
        metric: WindowMetric,
        span: WindowSpan,
        limit: u64,
        action: WindowAction,
    ) -> Vec<WindowMetricThreshold> {
        vec![WindowMetricThreshold {
            metric,
            span,
            limit,
            action,
        }]
    }

    #[test]
    fn totals_accumulate_across_all_horizons() {
        let mut detector = WindowDetector::new(AgentId::new("a1"), Vec::new());
        detector.record_at(WindowMetric::BytesOut, 100, t(0));
        detector.record_at(WindowMetric::BytesOut, 50, t(10));
        let totals = detector.current_totals_at(t(20));
        assert_eq!(totals.get("bytes_out_1h"), Some(&150));
        assert_eq!(totals.get("bytes_out_6h"), Some(&150));
        assert_eq!(totals.get("bytes_out_24h"), Some(&150));
        assert_eq!(totals.get("api_calls_1h"), Some(&0));
        assert_eq!(totals.len(), 18);
    }

    #[test]
    fn short_horizon_forgets_while_long_remembers() {
        let mut detector = WindowDetector::new(AgentId::new("a1"), Vec::new());
        detector.record_at(WindowMetric::BytesOut, 100, t(0));
        let totals = detector.current_totals_at(t(3_601));
        assert_eq!(totals.get("bytes_out_1h"), Some(&0));
        assert_eq!(totals.get("bytes_out_6h"), Some(&100));
        assert_eq!(totals.get("bytes_out_24h"), Some(&100));
    }

    #[test]
    fn event_exactly_at_the_cutoff_still_counts() {
        let mut detector = WindowDetector::new(AgentId::new("a1"), Vec::new());
        detector.record_at(WindowMetric::Connections, 1, t(0));
        let totals = detector.current_totals_at(t(3_600));
        assert_eq!(totals.get("connections_1h"), Some(&1));
        let totals = detector.current_totals_at(t(3_601));
        assert_eq!(totals.get("connections_1h"), Some(&0));
    }

    #[test]
    fn breach_requires_strictly_greater() {
        let mut detector = WindowDetector::new(
            AgentId::new("a1"),
            one_row(WindowMetric::ApiCalls, WindowSpan::Hour1, 100, WindowAction::Alert),
        );
        detector.record_at(WindowMetric::ApiCalls, 100, t(0));
        assert!(detector.check_thresholds_at(t(1)).is_empty());
        detector.record_at(WindowMetric::ApiCalls, 1, t(2));
        let breaches = detector.check_thresholds_at(t(3));
        assert_eq!(breaches.len(), 1);
        let breach = breaches.first().unwrap();
        assert_eq!(breach.observed, 101);
        assert_eq!(breach.limit, 100);
        assert_eq!(breach.action, WindowAction::Alert);
        assert_eq!(breach.span, WindowSpan::Hour1);
    }

    #[test]
    fn paced_exfiltration_trips_the_long_window_only() {
        // 100 KB every 60 s stays far under the 10 MB hourly alert limit
        // but crosses the 50 MB daily kill limit after ten hours.
        let mut detector = WindowDetector::new(AgentId::new("a1"), default_window_thresholds());
        for i in 0..600_i64 {
            detector.record_at(WindowMetric::BytesOut, 100_000, t(i.saturating_mul(60)));
        }
        let now = t(599_i64.saturating_mul(60));
        let breaches = detector.check_thresholds_at(now);
        assert_eq!(breaches.len(), 1);
        let breach = breaches.first().unwrap();
        assert_eq!(breach.metric, WindowMetric::BytesOut);
        assert_eq!(breach.span, WindowSpan::Hour24);
        assert_eq!(breach.action, WindowAction::Kill);
        assert_eq!(breach.observed, 60_000_000);
        assert!(detector.should_kill_at(now));
    }

    #[test]
    fn status_counts_breaches() {
        let mut detector = WindowDetector::new(
            AgentId::new("a1"),
            one_row(WindowMetric::FilesRead, WindowSpan::Hour1, 2, WindowAction::Alert),
        );
        detector.record_at(WindowMetric::FilesRead, 3, t(0));
        detector.check_thresholds_at(t(1));
        detector.check_thresholds_at(t(2));
        let status = detector.status_at(t(3));
        assert_eq!(status.breach_count, 2);
        assert_eq!(status.threshold_count, 1);
        assert_eq!(status.totals.get("files_read_1h"), Some(&3));
    }

    #[test]
    fn monitor_auto_registers_on_record() {
        let monitor = WindowMonitor::with_defaults();
        let id = AgentId::new("implicit");
        monitor.record_at(&id, WindowMetric::BytesOut, 64, t(0));
        let fleet = monitor.fleet_status_at(t(1));
        assert_eq!(fleet.total_agents, 1);
        let status = fleet.agents.get(&id).unwrap();
        assert_eq!(status.totals.get("bytes_out_1h"), Some(&64));
    }

    #[test]
    fn monitor_honors_custom_thresholds() {
        let monitor = WindowMonitor::with_defaults();
        let id = AgentId::new("strict");
        monitor.register(
            &id,
            Some(one_row(WindowMetric::Connections, WindowSpan::Hour1, 1, WindowAction::Kill)),
        );
        monitor.record_at(&id, WindowMetric::Connections, 2, t(0));
        let breaches = monitor.check_agent_at(&id, t(1));
        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches.first().unwrap().action, WindowAction::Kill);
    }

    #[test]
    fn monitor_unregister_drops_history() {
        let monitor = WindowMonitor::with_defaults();
        let id = AgentId::new("a1");
        monitor.record_at(&id, WindowMetric::BytesOut, 10, t(0));
        assert!(monitor.unregister(&id));
        assert!(!monitor.unregister(&id));
        assert!(monitor.agent_status_at(&id, t(1)).is_none());
    }

    #[test]
    fn check_all_covers_every_agent() {
        let monitor = WindowMonitor::with_defaults();
        monitor.record_at(&AgentId::new("a1"), WindowMetric::BytesOut, 1, t(0));
        monitor.record_at(&AgentId::new("a2"), WindowMetric::BytesOut, 1, t(0));
        let results = monitor.check_all_at(t(1));
        assert_eq!(results.len(), 2);
        assert!(results.values().all(Vec::is_empty));
    }

    #[test]
    fn default_table_matches_the_documented_rows() {
        let table = default_window_thresholds();
        assert_eq!(table.len(), 7);
        let daily_bytes = table
            .iter()
            .find(|r| r.metric == WindowMetric::BytesOut && r.span == WindowSpan::Hour24)
            .unwrap();
        assert_eq!(daily_bytes.limit, 50_000_000);
        assert_eq!(daily_bytes.action, WindowAction::Kill);
        assert!(
            table
                .iter()
                .filter(|r| r.action == WindowAction::Kill)
                .count()
                == 2
        );
    }

    #[test]
    fn prune_drops_agents_with_fully_drained_windows() {
        let monitor = WindowMonitor::with_defaults();
        monitor.record_at(&AgentId::new("fresh"), WindowMetric::BytesOut, 10, t(86_000));
        monitor.record_at(&AgentId::new("stale"), WindowMetric::BytesOut, 10, t(0));

        // The stale agent's last event falls out of even the 24h window.
        let dropped = monitor.prune_idle_at(t(86_401));

        assert_eq!(dropped, 1);
        assert!(monitor.agent_status_at(&AgentId::new("stale"), t(86_401)).is_none());
        assert!(monitor.agent_status_at(&AgentId::new("fresh"), t(86_401)).is_some());
    }
}
