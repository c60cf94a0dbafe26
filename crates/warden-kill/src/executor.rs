//! Escalating kill sequence with post-kill verification.
//!
//! One pass per target: probe, graceful signal, bounded wait, forceful
//! signal, bounded verification. Every phase is reflected in the returned
//! [`KillReport`] so callers can audit exactly how far the escalation went.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, Instant, sleep};
use tracing::{error, info, warn};

use warden_types::{KillReport, KillResult};

use crate::error::KillError;
use crate::process::ProcessControl;

/// Timing knobs for the escalation sequence.
#[derive(Debug, Clone, Copy)]
pub struct KillOptions {
    /// How long the graceful phase waits for the process to exit.
    pub soft_timeout_ms: u64,
    /// Pause between liveness probes.
    pub verify_interval_ms: u64,
    /// Probe budget after the forceful signal before declaring a zombie.
    pub max_verify_attempts: u32,
}

impl Default for KillOptions {
    fn default() -> Self {
        Self {
            soft_timeout_ms: 2_000,
            verify_interval_ms: 100,
            max_verify_attempts: 10,
        }
    }
}

/// Drives the escalating kill sequence against a [`ProcessControl`].
pub struct KillExecutor {
    control: Arc<dyn ProcessControl>,
    options: KillOptions,
}

impl KillExecutor {
    /// Creates an executor over the given control with the given timings.
    #[must_use]
    pub fn new(control: Arc<dyn ProcessControl>, options: KillOptions) -> Self {
        Self { control, options }
    }

    /// Runs the full escalation against one process.
    pub async fn kill(&self, pid: u32) -> KillReport {
        let started = Instant::now();

        if !self.control.is_alive(pid) {
            info!(pid, "kill requested for a process that is already gone");
            return report(pid, KillResult::AlreadyDead, false, false, Some(0), None);
        }

        match self.control.send_graceful(pid) {
            // A vanished target died on its own; the wait below confirms it.
            Ok(()) | Err(KillError::Vanished { .. }) => {}
            Err(err @ KillError::PermissionDenied { .. }) => {
                warn!(pid, "graceful signal refused, caller lacks privileges");
                return report(
                    pid,
                    KillResult::PermissionDenied,
                    false,
                    false,
                    None,
                    Some(err.to_string()),
                );
            }
            Err(err) => {
                error!(pid, error = %err, "graceful signal failed");
                return report(
                    pid,
                    KillResult::Failed,
                    false,
                    false,
                    None,
                    Some(err.to_string()),
                );
            }
        }

        if self.wait_for_exit(pid).await {
            let elapsed = elapsed_ms(started);
            info!(pid, elapsed_ms = elapsed, "process exited after graceful signal");
            return report(pid, KillResult::Soft, true, false, Some(elapsed), None);
        }

        warn!(pid, "graceful signal ignored, escalating");
        match self.control.send_forceful(pid) {
            Ok(()) | Err(KillError::Vanished { .. }) => {}
            Err(err) => {
                error!(pid, error = %err, "forceful signal failed");
                return report(
                    pid,
                    KillResult::Failed,
                    true,
                    false,
                    None,
                    Some(err.to_string()),
                );
            }
        }

        if self.verify_exit(pid).await {
            let elapsed = elapsed_ms(started);
            info!(pid, elapsed_ms = elapsed, "process exited after forceful signal");
            return report(pid, KillResult::Hard, true, true, Some(elapsed), None);
        }

        error!(pid, "process survived the forceful signal");
        report(
            pid,
            KillResult::Zombie,
            true,
            true,
            None,
            Some(format!("process {pid} still alive after forceful kill")),
        )
    }

    /// Kills every descendant of `pid`, then the process itself.
    ///
    /// Descendants are taken deepest-first so children never outlive the
    /// sweep that reached them through their parent.
    pub async fn kill_tree(&self, pid: u32) -> Vec<KillReport> {
        let mut targets = self.control.list_children(pid);
        info!(pid, descendants = targets.len(), "killing process tree");
        targets.reverse();
        let mut reports = Vec::with_capacity(targets.len().saturating_add(1));
        for target in targets {
            reports.push(self.kill(target).await);
        }
        reports.push(self.kill(pid).await);
        reports
    }

    /// Kills a batch of unrelated pids, one escalation each.
    pub async fn kill_many(&self, pids: &[u32]) -> Vec<KillReport> {
        let mut reports = Vec::with_capacity(pids.len());
        for &pid in pids {
            reports.push(self.kill(pid).await);
        }
        reports
    }

    /// Probes until the process exits or the graceful budget runs out.
    async fn wait_for_exit(&self, pid: u32) -> bool {
        let interval = self.options.verify_interval_ms.max(1);
        let probes = self.options.soft_timeout_ms.checked_div(interval).unwrap_or(0).max(1);
        for _ in 0..probes {
            if !self.control.is_alive(pid) {
                return true;
            }
            sleep(Duration::from_millis(interval)).await;
        }
        false
    }

    /// Probes after the forceful signal until death is confirmed or the
    /// attempt budget runs out.
    async fn verify_exit(&self, pid: u32) -> bool {
        for _ in 0..self.options.max_verify_attempts {
            if !self.control.is_alive(pid) {
                return true;
            }
            sleep(Duration::from_millis(self.options.verify_interval_ms)).await;
        }
        !self.control.is_alive(pid)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn report(
    pid: u32,
    result: KillResult,
    soft_sent: bool,
    hard_sent: bool,
    time_to_death_ms: Option<u64>,
    error: Option<String>,
) -> KillReport {
    KillReport {
        pid,
        result,
        soft_sent,
        hard_sent,
        time_to_death_ms,
        error,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::process::StubProcessControl;

    fn executor(control: &Arc<StubProcessControl>) -> KillExecutor {
        KillExecutor::new(Arc::clone(control) as Arc<dyn ProcessControl>, KillOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn already_dead_targets_short_circuit() {
        let control = Arc::new(StubProcessControl::new());

        let report = executor(&control).kill(7).await;

        assert_eq!(report.result, KillResult::AlreadyDead);
        assert_eq!(report.time_to_death_ms, Some(0));
        assert!(!report.soft_sent);
        assert!(control.graceful_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_exit_is_reported_as_soft() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn(41);

        let report = executor(&control).kill(41).await;

        assert_eq!(report.result, KillResult::Soft);
        assert!(report.result.is_dead());
        assert!(report.soft_sent);
        assert!(!report.hard_sent);
        assert!(control.forceful_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_processes_take_the_forceful_path() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn_stubborn(42);

        let report = executor(&control).kill(42).await;

        assert_eq!(report.result, KillResult::Hard);
        assert!(report.soft_sent);
        assert!(report.hard_sent);
        assert_eq!(control.forceful_log(), vec![42]);
        assert!(report.time_to_death_ms.unwrap() >= 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn survivors_are_reported_as_zombies() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn_unkillable(43);

        let report = executor(&control).kill(43).await;

        assert_eq!(report.result, KillResult::Zombie);
        assert!(report.soft_sent);
        assert!(report.hard_sent);
        assert!(report.time_to_death_ms.is_none());
        assert!(report.error.unwrap().contains("still alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_failures_stop_the_escalation() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn(44);
        control.deny(44);

        let report = executor(&control).kill(44).await;

        assert_eq!(report.result, KillResult::PermissionDenied);
        assert!(!report.soft_sent);
        assert!(!report.hard_sent);
        assert!(control.is_alive(44));
    }

    #[tokio::test(start_paused = true)]
    async fn a_target_vanishing_mid_signal_counts_as_soft() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn(45);
        control.vanish_on_signal(45);

        let report = executor(&control).kill(45).await;

        assert_eq!(report.result, KillResult::Soft);
        assert!(report.soft_sent);
    }

    #[tokio::test(start_paused = true)]
    async fn tree_kill_takes_the_deepest_children_first() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn(100);
        control.spawn(101);
        control.spawn(102);
        control.set_children(100, vec![101]);
        control.set_children(101, vec![102]);

        let reports = executor(&control).kill_tree(100).await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.result == KillResult::Soft));
        assert_eq!(control.graceful_log(), vec![102, 101, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_kills_report_every_target() {
        let control = Arc::new(StubProcessControl::new());
        control.spawn(1);
        control.spawn_stubborn(2);

        let reports = executor(&control).kill_many(&[1, 2, 3]).await;

        let results: Vec<KillResult> = reports.iter().map(|r| r.result).collect();
        assert_eq!(
            results,
            vec![KillResult::Soft, KillResult::Hard, KillResult::AlreadyDead]
        );
    }
}
