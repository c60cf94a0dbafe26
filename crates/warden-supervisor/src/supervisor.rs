//! The containment supervisor: every detection and enforcement layer
//! behind one handle.
//!
//! [`Supervisor`] owns the agent registry, the detection engines from
//! `warden-core`, and the kill layers from `warden-kill`, and wires them
//! into the pipeline every agent action passes through: containment gate,
//! rate thresholds, exfiltration caps, multi-window accumulation, then the
//! authoritative validator (or its fail mode). It is cheap to clone and
//! clones share state, so the HTTP surface, the maintenance ticker, and
//! spawned containment tasks all hold the same supervisor.
//!
//! Containment runs off the check path. A kill-tagged finding blocks the
//! offending action immediately and spawns the kill onto the runtime, so a
//! check never waits on process or firewall work. Duplicate kill requests
//! for an agent join the attempt already in flight and observe its report.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Notify, OnceCell, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use warden_core::config::{SupervisorConfig, WardenConfig};
use warden_core::exfiltration::{ExfiltrationMonitor, ExfiltrationStats, is_data_bearing};
use warden_core::failmode::{FailModeHandler, FailModeStats};
use warden_core::thresholds::{
    AgentThresholdStatus, COOLDOWN_THRESHOLD, ThresholdEngine, ThresholdStats,
};
use warden_core::window::{DetectorStatus, WindowMonitor};
use warden_kill::executor::{KillExecutor, KillOptions};
use warden_kill::firewall::FirewallBackend;
use warden_kill::netblock::{NetworkKillManager, NetworkStatus};
use warden_kill::process::{ProcessControl, SystemProcessControl};
use warden_types::{
    AgentId, AgentRecord, ContainmentEvent, ContainmentOutcome, ContainmentReport,
    ContainmentStatus, Decision, NetworkKillReport, RiskLevel, ThresholdAction, ThresholdBreach,
    WindowAction, WindowBreach, WindowMetric, action_types,
};

use crate::history::CappedLog;
use crate::registry::AgentRegistry;
use crate::validator::Validator;

/// Capacity of the containment event broadcast channel. Slow subscribers
/// lag and skip rather than stall the supervisor.
pub const BROADCAST_CAPACITY: usize = 256;

/// Risk attributed to a breach that requests containment.
const KILL_RISK: f64 = 95.0;

/// Risk attributed to an exfiltration finding.
const EXFILTRATION_RISK: f64 = 95.0;

/// Risk attributed to a kill-tagged window breach.
const WINDOW_KILL_RISK: f64 = 90.0;

/// Risk attributed to any action from an already-contained agent.
const CONTAINED_RISK: f64 = 100.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by supervisor operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// The operation named an agent the registry does not know.
    #[error("agent '{0}' is not registered")]
    UnknownAgent(AgentId),
}

// ---------------------------------------------------------------------------
// Status views
// ---------------------------------------------------------------------------

/// Everything known about one agent, assembled across the layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    /// The registry entry: bound PIDs and containment status.
    pub record: AgentRecord,
    /// Windowed action counts, cooldowns, and recent breaches.
    pub thresholds: AgentThresholdStatus,
    /// Short-window byte volume and target fan-out.
    pub exfiltration: ExfiltrationStats,
    /// Multi-window running totals, when the agent has a detector.
    pub windows: Option<DetectorStatus>,
    /// Whether network containment is currently applied.
    pub network_blocked: bool,
    /// Risk posture derived from the agent's recent breach record.
    pub risk_level: RiskLevel,
}

/// Fleet-wide counters and per-layer summaries.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    /// Agents currently registered.
    pub agents: usize,
    /// Agent counts grouped by containment status label.
    pub agents_by_status: BTreeMap<String, usize>,
    /// Threshold engine counters.
    pub thresholds: ThresholdStats,
    /// Breach findings ever logged, across all detection layers.
    pub breaches_total: u64,
    /// Containment reports ever logged.
    pub kills_total: u64,
    /// Fail-mode activations and policy cache counters.
    pub fail_mode: FailModeStats,
    /// Network containment summary.
    pub network: NetworkStatus,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Shared state behind the cloneable handle.
struct Inner {
    config: SupervisorConfig,
    registry: AgentRegistry,
    thresholds: ThresholdEngine,
    exfiltration: ExfiltrationMonitor,
    windows: WindowMonitor,
    failmode: FailModeHandler,
    validator: Option<Arc<dyn Validator>>,
    killer: KillExecutor,
    network: NetworkKillManager,
    events: broadcast::Sender<ContainmentEvent>,
    breaches: Mutex<CappedLog<ContainmentEvent>>,
    kills: Mutex<CappedLog<ContainmentReport>>,
    /// One cell per agent with a kill in flight; duplicates join it.
    kills_in_flight: Mutex<BTreeMap<AgentId, Arc<OnceCell<ContainmentReport>>>>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

/// The containment supervisor.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Build a supervisor from loaded configuration, controlling real host
    /// processes through the given firewall backend.
    pub fn new(config: &WardenConfig, firewall: Box<dyn FirewallBackend>) -> Self {
        Self::with_parts(config, Arc::new(SystemProcessControl::new()), firewall, None)
    }

    /// Build a supervisor from explicit parts. Tests inject fakes here; the
    /// daemon passes the system process control and a validator client.
    pub fn with_parts(
        config: &WardenConfig,
        control: Arc<dyn ProcessControl>,
        firewall: Box<dyn FirewallBackend>,
        validator: Option<Arc<dyn Validator>>,
    ) -> Self {
        let thresholds = if config.thresholds.custom.is_empty() {
            ThresholdEngine::with_defaults()
        } else {
            ThresholdEngine::new(config.thresholds.custom.clone())
        };
        let windows = if config.windows.custom.is_empty() {
            WindowMonitor::with_defaults()
        } else {
            WindowMonitor::new(config.windows.custom.clone())
        };
        let options = KillOptions {
            soft_timeout_ms: config.kill.soft_timeout_ms,
            verify_interval_ms: config.kill.verify_interval_ms,
            max_verify_attempts: config.kill.max_verify_attempts,
        };
        let platform = firewall.platform();
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        info!(
            block_risk_threshold = config.supervisor.block_risk_threshold,
            firewall = platform,
            validator = validator.is_some(),
            "containment supervisor initialized"
        );
        Self {
            inner: Arc::new(Inner {
                config: config.supervisor.clone(),
                registry: AgentRegistry::new(),
                thresholds,
                exfiltration: ExfiltrationMonitor::new(&config.exfiltration),
                windows,
                failmode: FailModeHandler::new(&config.fail_mode),
                validator,
                killer: KillExecutor::new(control, options),
                network: NetworkKillManager::new(firewall),
                events,
                breaches: Mutex::new(CappedLog::new()),
                kills: Mutex::new(CappedLog::new()),
                kills_in_flight: Mutex::new(BTreeMap::new()),
                shutdown: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
            }),
        }
    }

    // -- registration -------------------------------------------------------

    /// Register an agent's process. New agents also get a window detector;
    /// re-registration only binds the PID and leaves detection state alone.
    pub fn register_agent(&self, agent_id: &AgentId, pid: u32) -> usize {
        if self.inner.registry.get(agent_id).is_none() {
            self.inner.windows.register(agent_id, None);
        }
        self.inner.registry.register(agent_id, pid)
    }

    /// Bind a further PID to an already-registered agent.
    pub fn add_pid(&self, agent_id: &AgentId, pid: u32) -> bool {
        self.inner.registry.add_pid(agent_id, pid)
    }

    /// Remove an agent and drop all of its detection state.
    pub fn unregister_agent(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        self.purge_detection_state(agent_id);
        self.inner.registry.unregister(agent_id)
    }

    // -- the check pipeline --------------------------------------------------

    /// Decide whether one agent action may proceed, as of now.
    ///
    /// A blocked decision must not be acted on by the caller. Unknown agents
    /// are observed into the registry so detection state accrues from their
    /// first action onward.
    pub async fn check(
        &self,
        agent_id: &AgentId,
        action_type: &str,
        target: &str,
        data_size: u64,
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> Decision {
        self.check_at(agent_id, action_type, target, data_size, metadata, Utc::now())
            .await
    }

    /// Decide as of an explicit instant. The validator deadline still runs
    /// on the runtime clock.
    pub async fn check_at(
        &self,
        agent_id: &AgentId,
        action_type: &str,
        target: &str,
        data_size: u64,
        metadata: &BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Decision {
        self.inner.registry.observe_at(agent_id, now);

        // Containment gate: a contained agent gets no further evaluation.
        if let Some(record) = self.inner.registry.get(agent_id)
            && record.status.is_contained()
        {
            debug!(
                agent_id = %agent_id,
                status = record.status.label(),
                "contained agent blocked outright"
            );
            return Decision::block(
                format!("agent is {}", record.status.label()),
                CONTAINED_RISK,
            );
        }

        // Action-rate thresholds.
        let (allowed, breach) =
            self.inner
                .thresholds
                .check_action_at(agent_id, action_type, target, now);
        if !allowed {
            return self.resolve_threshold_block(agent_id, action_type, breach);
        }

        // Exfiltration caps and window accumulation, for actions moving data.
        if is_data_bearing(action_type, data_size) {
            if let Some(reason) =
                self.inner
                    .exfiltration
                    .record_access_at(agent_id, target, data_size, now)
            {
                warn!(agent_id = %agent_id, %reason, "exfiltration detected");
                self.publish_breach(ContainmentEvent::ExfiltrationDetected {
                    agent_id: agent_id.clone(),
                    reason: reason.clone(),
                    timestamp: now,
                });
                self.trigger_containment(agent_id, "exfiltration cap exceeded");
                return Decision::block(
                    format!("exfiltration detected: {reason}"),
                    EXFILTRATION_RISK,
                );
            }

            for (metric, value) in window_feeds(action_type, data_size) {
                self.inner.windows.record_at(agent_id, metric, value, now);
            }
            let window_breaches = self.route_window_breaches(agent_id, now);
            if let Some(breach) = window_breaches
                .iter()
                .find(|breach| breach.action == WindowAction::Kill)
            {
                return Decision::block(
                    format!(
                        "window limit exceeded: {} over {} ({} > {})",
                        breach.metric.label(),
                        breach.span.label(),
                        breach.observed,
                        breach.limit
                    ),
                    WINDOW_KILL_RISK,
                );
            }
        }

        // The authoritative validator, bounded by the configured deadline.
        if let Some(validator) = self.inner.validator.as_deref() {
            return self
                .consult_validator(validator, action_type, target, metadata, now)
                .await;
        }

        debug!(agent_id = %agent_id, action_type, "allowed within local limits");
        Decision::allow("within limits", 0.0)
    }

    /// Turn a threshold block into a decision, logging and escalating as the
    /// breach demands. Cooldown blocks are routine denials, not findings.
    fn resolve_threshold_block(
        &self,
        agent_id: &AgentId,
        action_type: &str,
        breach: Option<ThresholdBreach>,
    ) -> Decision {
        let Some(breach) = breach else {
            // The engine could not evaluate. Local faults never fail open.
            error!(agent_id = %agent_id, action_type, "threshold engine unavailable, failing closed");
            return Decision::block("threshold engine unavailable", CONTAINED_RISK);
        };

        if breach.threshold_name == COOLDOWN_THRESHOLD {
            debug!(agent_id = %agent_id, action_type, "blocked by active cooldown");
        } else {
            warn!(
                agent_id = %agent_id,
                threshold = %breach.threshold_name,
                count = breach.count,
                limit = breach.limit,
                should_kill = breach.should_kill,
                "threshold breached"
            );
            self.publish_breach(ContainmentEvent::ThresholdBreached(breach.clone()));
            if breach.should_kill {
                self.trigger_containment(agent_id, "kill-tagged threshold breach");
            }
        }

        let risk = threshold_risk(&breach);
        let mut decision = Decision::block(
            format!(
                "threshold '{}' blocked {}",
                breach.threshold_name, breach.action_type
            ),
            risk,
        );
        decision.breach = Some(breach);
        decision
    }

    /// Ask the validator for a verdict, caching successes and routing
    /// failures (including the deadline) through the fail-mode handler.
    async fn consult_validator(
        &self,
        validator: &dyn Validator,
        action_type: &str,
        target: &str,
        metadata: &BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Decision {
        let deadline = Duration::from_millis(self.inner.config.validator_timeout_ms);
        let outcome =
            tokio::time::timeout(deadline, validator.validate(action_type, target, metadata))
                .await;
        match outcome {
            Ok(Ok(verdict)) => {
                let allowed = verdict.risk_score < self.inner.config.block_risk_threshold;
                self.inner.failmode.cache_result(
                    action_type,
                    target,
                    allowed,
                    verdict.risk_score,
                    metadata.clone(),
                );
                if allowed {
                    debug!(action_type, target, risk = verdict.risk_score, "validator allowed action");
                    return Decision::allow(
                        format!("validated, risk {:.1}", verdict.risk_score),
                        verdict.risk_score,
                    );
                }
                warn!(action_type, target, risk = verdict.risk_score, "validator blocked action");
                let reason = if verdict.reasons.is_empty() {
                    format!("validator risk {:.1} at or above threshold", verdict.risk_score)
                } else {
                    verdict.reasons.join("; ")
                };
                Decision::block(reason, verdict.risk_score)
            }
            Ok(Err(failure)) => {
                self.resolve_validator_failure(action_type, target, &failure.to_string(), now)
            }
            Err(_) => self.resolve_validator_failure(
                action_type,
                target,
                &format!(
                    "validator timed out after {}ms",
                    self.inner.config.validator_timeout_ms
                ),
                now,
            ),
        }
    }

    /// Let the fail-mode handler decide in the validator's place.
    fn resolve_validator_failure(
        &self,
        action_type: &str,
        target: &str,
        failure: &str,
        now: DateTime<Utc>,
    ) -> Decision {
        let decided = self
            .inner
            .failmode
            .on_failure_at(action_type, target, failure, now);
        self.publish(ContainmentEvent::FailModeActivated {
            mode: self.inner.failmode.mode(),
            action: action_type.to_owned(),
            target: target.to_owned(),
            error: failure.to_owned(),
            timestamp: now,
        });
        Decision {
            allowed: decided.allowed,
            reason: decided.reason,
            risk_score: decided.risk_score,
            breach: None,
        }
    }

    // -- out-of-band metrics -------------------------------------------------

    /// Feed the multi-window detector outside the check path, as of now.
    ///
    /// Proxies and collectors report transfer volumes here after the fact.
    /// Breaches found by the feed are routed exactly as on the check path:
    /// logged, published, and escalated to containment when kill-tagged.
    pub fn record(&self, agent_id: &AgentId, metric: WindowMetric, value: u64) -> Vec<WindowBreach> {
        self.record_at(agent_id, metric, value, Utc::now())
    }

    /// Feed the detector as of an explicit instant.
    pub fn record_at(
        &self,
        agent_id: &AgentId,
        metric: WindowMetric,
        value: u64,
        now: DateTime<Utc>,
    ) -> Vec<WindowBreach> {
        self.inner.registry.observe_at(agent_id, now);
        self.inner.windows.record_at(agent_id, metric, value, now);
        self.route_window_breaches(agent_id, now)
    }

    /// Evaluate the agent's window thresholds, publish every breach, and
    /// escalate once when any of them is kill-tagged.
    fn route_window_breaches(&self, agent_id: &AgentId, now: DateTime<Utc>) -> Vec<WindowBreach> {
        let breaches = self.inner.windows.check_agent_at(agent_id, now);
        let mut kill_tagged = false;
        for breach in &breaches {
            warn!(
                agent_id = %agent_id,
                metric = breach.metric.label(),
                span = breach.span.label(),
                observed = breach.observed,
                limit = breach.limit,
                "window threshold breached"
            );
            kill_tagged = kill_tagged || breach.action == WindowAction::Kill;
            self.publish_breach(ContainmentEvent::WindowBreached(breach.clone()));
        }
        if kill_tagged {
            self.trigger_containment(agent_id, "kill-tagged window breach");
        }
        breaches
    }

    // -- containment ---------------------------------------------------------

    /// Spawn containment of an agent without waiting for it. The offending
    /// action is blocked by the caller; the kill proceeds in the background.
    fn trigger_containment(&self, agent_id: &AgentId, cause: &'static str) {
        error!(agent_id = %agent_id, cause, "containment triggered");
        let supervisor = self.clone();
        let agent_id = agent_id.clone();
        tokio::spawn(async move {
            match supervisor.kill_agent(&agent_id).await {
                Ok(report) => {
                    info!(
                        agent_id = %agent_id,
                        outcome = ?report.status,
                        "triggered containment finished"
                    );
                }
                Err(skipped) => {
                    warn!(agent_id = %agent_id, %skipped, "triggered containment not run");
                }
            }
        });
    }

    /// Contain an agent: tree-kill every bound PID and cut its network,
    /// concurrently.
    ///
    /// Duplicate calls while a kill is in flight join it and receive the
    /// same report. Only full containment unregisters the agent; a partial
    /// or failed attempt leaves the entry in place so a retry can finish
    /// the job.
    pub async fn kill_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<ContainmentReport, SupervisorError> {
        let cell = self.join_or_start_kill(agent_id)?;
        let report = cell.get_or_init(|| self.execute_kill(agent_id)).await.clone();
        self.clear_in_flight(agent_id, &cell);
        Ok(report)
    }

    /// Contain every registered agent concurrently.
    pub async fn kill_all(&self) -> Vec<ContainmentReport> {
        let ids = self.inner.registry.agent_ids();
        if ids.is_empty() {
            return Vec::new();
        }
        warn!(agents = ids.len(), "containing all registered agents");
        let kills = ids.iter().map(|agent_id| self.kill_agent(agent_id));
        futures::future::join_all(kills)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Look up the in-flight cell for the agent, creating one when no kill
    /// is running. Unknown agents are refused.
    fn join_or_start_kill(
        &self,
        agent_id: &AgentId,
    ) -> Result<Arc<OnceCell<ContainmentReport>>, SupervisorError> {
        if self.inner.registry.get(agent_id).is_none() {
            return Err(SupervisorError::UnknownAgent(agent_id.clone()));
        }
        let Ok(mut in_flight) = self.inner.kills_in_flight.lock() else {
            error!("kill tracker lock poisoned, running unshared kill");
            return Ok(Arc::new(OnceCell::new()));
        };
        Ok(Arc::clone(in_flight.entry(agent_id.clone()).or_default()))
    }

    /// Drop the in-flight cell once its kill has resolved, leaving any
    /// newer cell (from a later retry) in place.
    fn clear_in_flight(&self, agent_id: &AgentId, cell: &Arc<OnceCell<ContainmentReport>>) {
        let Ok(mut in_flight) = self.inner.kills_in_flight.lock() else {
            return;
        };
        if in_flight
            .get(agent_id)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            in_flight.remove(agent_id);
        }
    }

    /// Run both containment layers and resolve the overall outcome.
    async fn execute_kill(&self, agent_id: &AgentId) -> ContainmentReport {
        let started = Utc::now();
        error!(agent_id = %agent_id, "containment starting");
        self.publish(ContainmentEvent::KillStarted {
            agent_id: agent_id.clone(),
            timestamp: started,
        });

        let pids = self.inner.registry.pids_of(agent_id);

        let process_layer = async {
            let mut reports = Vec::new();
            for pid in &pids {
                reports.extend(self.inner.killer.kill_tree(*pid).await);
            }
            let all_dead = reports.iter().all(|report| report.result.is_dead());
            if all_dead && !reports.is_empty() {
                self.inner
                    .registry
                    .set_status(agent_id, ContainmentStatus::ProcessKilled);
            }
            (reports, all_dead)
        };
        let network_layer = async {
            let report = self.inner.network.kill_network(agent_id).await;
            if report.result.is_success() {
                self.inner
                    .registry
                    .set_status(agent_id, ContainmentStatus::NetworkBlocked);
            }
            report
        };

        let ((process_reports, processes_dead), network_report) =
            futures::future::join(process_layer, network_layer).await;

        let network_blocked = network_report.result.is_success();
        let status = match (processes_dead, network_blocked) {
            (true, true) => ContainmentOutcome::Full,
            (false, false) => ContainmentOutcome::Failed,
            _ => ContainmentOutcome::Partial,
        };

        match status {
            ContainmentOutcome::Full => {
                self.inner
                    .registry
                    .set_status(agent_id, ContainmentStatus::FullyContained);
                self.purge_detection_state(agent_id);
                self.inner.registry.unregister(agent_id);
                info!(
                    agent_id = %agent_id,
                    processes = process_reports.len(),
                    "agent fully contained"
                );
            }
            ContainmentOutcome::Partial => {
                self.inner
                    .registry
                    .set_status(agent_id, ContainmentStatus::PartiallyContained);
                warn!(
                    agent_id = %agent_id,
                    processes_dead,
                    network_blocked,
                    "agent only partially contained"
                );
            }
            ContainmentOutcome::Failed => {
                // Status stays as it was so the agent remains gated and the
                // operator can retry.
                error!(agent_id = %agent_id, "containment failed on both layers");
            }
        }

        let report = ContainmentReport {
            agent_id: agent_id.clone(),
            status,
            process_reports,
            network_report: Some(network_report),
            timestamp: Utc::now(),
        };

        self.log_kill(&report);
        self.publish(ContainmentEvent::KillCompleted(report.clone()));
        report
    }

    /// Lift network containment from an agent.
    ///
    /// An agent whose only containment was the network block returns to
    /// active monitoring when the restore succeeds.
    pub async fn restore_agent(&self, agent_id: &AgentId) -> NetworkKillReport {
        let report = self.inner.network.restore_network(agent_id).await;
        if report.result.is_success() {
            if let Some(record) = self.inner.registry.get(agent_id)
                && matches!(
                    record.status,
                    ContainmentStatus::NetworkBlocked | ContainmentStatus::PartiallyContained
                )
            {
                self.inner
                    .registry
                    .set_status(agent_id, ContainmentStatus::Active);
                info!(agent_id = %agent_id, "agent returned to active monitoring");
            }
            self.publish(ContainmentEvent::NetworkRestored {
                agent_id: agent_id.clone(),
                timestamp: Utc::now(),
            });
        }
        report
    }

    /// Drop the detection state the engines hold for an agent.
    fn purge_detection_state(&self, agent_id: &AgentId) {
        self.inner.thresholds.reset_agent(agent_id);
        self.inner.exfiltration.reset_agent(agent_id);
        self.inner.windows.unregister(agent_id);
    }

    // -- status and histories ------------------------------------------------

    /// Everything known about one agent, or `None` when unregistered.
    pub fn agent_status(&self, agent_id: &AgentId) -> Option<AgentStatus> {
        self.agent_status_at(agent_id, Utc::now())
    }

    /// Agent status as of an explicit instant.
    pub fn agent_status_at(&self, agent_id: &AgentId, now: DateTime<Utc>) -> Option<AgentStatus> {
        let record = self.inner.registry.get(agent_id)?;
        let thresholds = self.inner.thresholds.agent_status_at(agent_id, now);
        let risk_level = thresholds.risk_level;
        Some(AgentStatus {
            record,
            thresholds,
            exfiltration: self.inner.exfiltration.agent_stats_at(agent_id, now),
            windows: self.inner.windows.agent_status_at(agent_id, now),
            network_blocked: self.inner.network.is_blocked(agent_id),
            risk_level,
        })
    }

    /// Registry entries for every agent, in id order.
    pub fn list_agents(&self) -> Vec<AgentRecord> {
        self.inner.registry.list()
    }

    /// Fleet-wide counters and per-layer summaries.
    pub async fn fleet_status(&self) -> FleetStatus {
        let breaches_total = self.inner.breaches.lock().map_or(0, |log| log.total());
        let kills_total = self.inner.kills.lock().map_or(0, |log| log.total());
        FleetStatus {
            agents: self.inner.registry.len(),
            agents_by_status: self.inner.registry.count_by_status(),
            thresholds: self.inner.thresholds.stats(),
            breaches_total,
            kills_total,
            fail_mode: self.inner.failmode.stats(),
            network: self.inner.network.status().await,
        }
    }

    /// Breach findings newest first, optionally filtered to one agent.
    pub fn breach_history(&self, agent_id: Option<&AgentId>, limit: usize) -> Vec<ContainmentEvent> {
        let Ok(log) = self.inner.breaches.lock() else {
            error!("breach history lock poisoned");
            return Vec::new();
        };
        agent_id.map_or_else(
            || log.recent(limit),
            |filter| {
                log.all()
                    .iter()
                    .filter(|event| event.agent_id() == Some(filter))
                    .take(limit)
                    .cloned()
                    .collect()
            },
        )
    }

    /// Containment reports newest first.
    pub fn kill_history(&self, limit: usize) -> Vec<ContainmentReport> {
        self.inner
            .kills
            .lock()
            .map_or_else(|_| Vec::new(), |log| log.recent(limit))
    }

    /// Subscribe to containment events. Receivers that fall behind the
    /// channel capacity lag and skip rather than stall the supervisor.
    pub fn subscribe(&self) -> broadcast::Receiver<ContainmentEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: ContainmentEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Log a finding in the breach history, then broadcast it.
    fn publish_breach(&self, event: ContainmentEvent) {
        self.log_breach(&event);
        self.publish(event);
    }

    fn log_breach(&self, event: &ContainmentEvent) {
        let Ok(mut log) = self.inner.breaches.lock() else {
            error!("breach history lock poisoned, finding not logged");
            return;
        };
        log.push(event.clone());
    }

    fn log_kill(&self, report: &ContainmentReport) {
        let Ok(mut log) = self.inner.kills.lock() else {
            error!("kill history lock poisoned, report not logged");
            return;
        };
        log.push(report.clone());
    }

    // -- maintenance ---------------------------------------------------------

    /// Spawn the maintenance ticker: persists the policy cache and prunes
    /// idle detection state until [`shutdown`](Self::shutdown) is signalled.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.maintenance_loop().await })
    }

    async fn maintenance_loop(&self) {
        let period = Duration::from_secs(self.inner.config.maintenance_interval_seconds.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_seconds = period.as_secs(), "maintenance ticker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_maintenance(),
                () = self.inner.shutdown_notify.notified() => {}
            }
            if self.inner.shutdown.load(Ordering::Acquire) {
                break;
            }
        }
        // A final persist so a clean shutdown never loses cache entries.
        self.inner.failmode.persist_cache();
        info!("maintenance ticker stopped");
    }

    /// One maintenance pass: persist the policy cache and prune agents
    /// whose detection state has been idle past the configured horizon.
    pub fn run_maintenance(&self) {
        self.inner.failmode.persist_cache();
        let idle = self.inner.config.cleanup_idle_seconds;
        let thresholds = self.inner.thresholds.prune_idle(idle);
        let exfiltration = self.inner.exfiltration.prune_idle();
        let windows = self.inner.windows.prune_idle();
        debug!(thresholds, exfiltration, windows, "maintenance pass pruned idle state");
    }

    /// Signal the maintenance ticker to stop after a final cache persist.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.shutdown_notify.notify_one();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

/// Risk attributed to a threshold block, by breach severity.
const fn threshold_risk(breach: &ThresholdBreach) -> f64 {
    if breach.should_kill {
        return KILL_RISK;
    }
    match breach.breach_action {
        ThresholdAction::Warn => 40.0,
        ThresholdAction::Throttle => 50.0,
        ThresholdAction::Block => 60.0,
        ThresholdAction::Kill => KILL_RISK,
    }
}

/// Window lanes fed by one data-bearing action.
fn window_feeds(action_type: &str, data_size: u64) -> Vec<(WindowMetric, u64)> {
    match action_type {
        action_types::FILE_READ => vec![
            (WindowMetric::FilesRead, 1),
            (WindowMetric::BytesIn, data_size),
        ],
        action_types::DB_QUERY => vec![
            (WindowMetric::RecordsAccessed, 1),
            (WindowMetric::BytesIn, data_size),
        ],
        action_types::NETWORK_REQUEST => vec![
            (WindowMetric::Connections, 1),
            (WindowMetric::BytesOut, data_size),
        ],
        _ => Vec::new(),
    }
}
