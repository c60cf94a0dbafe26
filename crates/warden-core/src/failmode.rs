//! Validator failure handling.
//!
//! When the external validator times out or errors, the supervisor cannot
//! simply guess. The [`FailModeHandler`] turns a validator failure into a
//! deliberate decision according to the configured [`FailMode`]:
//!
//! - `closed` blocks the action at risk 100. This is the default.
//! - `cached` replays the last verified decision for the same
//!   (action, target) from the [`PolicyCache`], falling back to closed
//!   when nothing usable is cached.
//! - `open` allows the action at risk 0. Construction and every activation
//!   log at error severity; this mode exists for development only and is
//!   never defaulted to.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use warden_types::FailMode;

use crate::cache::{CacheStats, PolicyCache};
use crate::config::FailModeConfig;

/// The decision produced for one validator failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailDecision {
    /// Whether the action proceeds.
    pub allowed: bool,
    /// Human-readable explanation of how the decision was reached.
    pub reason: String,
    /// Risk score standing in for the validator's: 100 blocked, 0 open,
    /// or the cached score when replaying.
    pub risk_score: f64,
}

/// Counters returned by [`FailModeHandler::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailModeStats {
    /// The configured mode.
    pub mode: FailMode,
    /// Failures resolved by blocking (closed mode plus cached fallbacks).
    pub fail_closed: u64,
    /// Failures resolved by replaying a cached decision.
    pub fail_cached: u64,
    /// Failures resolved by allowing in open mode.
    pub fail_open: u64,
    /// All validator failures handled.
    pub total_failures: u64,
    /// When the most recent failure was handled.
    pub last_failure: Option<DateTime<Utc>>,
    /// Policy cache counters.
    pub cache: CacheStats,
}

#[derive(Debug, Default)]
struct HandlerInner {
    fail_closed: u64,
    fail_cached: u64,
    fail_open: u64,
    last_failure: Option<DateTime<Utc>>,
}

/// Thread-safe fail-mode dispatcher owning the policy cache.
pub struct FailModeHandler {
    mode: FailMode,
    cache: PolicyCache,
    inner: Mutex<HandlerInner>,
}

impl FailModeHandler {
    /// Create a handler, loading any persisted policy cache.
    pub fn new(config: &FailModeConfig) -> Self {
        info!(mode = mode_label(config.mode), "fail-mode handler initialized");
        if config.mode == FailMode::Open {
            error!(
                "fail-open mode enabled; actions will be allowed when validation fails"
            );
        }
        Self {
            mode: config.mode,
            cache: PolicyCache::new(&config.cache),
            inner: Mutex::new(HandlerInner::default()),
        }
    }

    /// The configured mode.
    pub const fn mode(&self) -> FailMode {
        self.mode
    }

    /// Resolve a validator failure, as of now.
    pub fn on_failure(&self, action: &str, target: &str, error: &str) -> FailDecision {
        self.on_failure_at(action, target, error, Utc::now())
    }

    /// Resolve a validator failure as of an explicit instant.
    pub fn on_failure_at(
        &self,
        action: &str,
        target: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> FailDecision {
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_failure = Some(now);
        }

        match self.mode {
            FailMode::Closed => {
                self.bump(FailMode::Closed);
                warn!(action = %action, target = %target, %error, "fail-closed blocked action");
                FailDecision {
                    allowed: false,
                    reason: format!("fail-closed: {action} blocked after validator failure: {error}"),
                    risk_score: 100.0,
                }
            }
            FailMode::Cached => self.replay_or_close(action, target, now),
            FailMode::Open => {
                self.bump(FailMode::Open);
                error!(
                    action = %action,
                    target = %target,
                    %error,
                    "fail-open allowed action despite validator failure"
                );
                FailDecision {
                    allowed: true,
                    reason: format!("fail-open: {action} allowed despite validator failure: {error}"),
                    risk_score: 0.0,
                }
            }
        }
    }

    fn replay_or_close(&self, action: &str, target: &str, now: DateTime<Utc>) -> FailDecision {
        match self.cache.get_at(action, target, now) {
            Some(policy) => {
                self.bump(FailMode::Cached);
                let age_seconds = now
                    .signed_duration_since(policy.cached_at)
                    .num_seconds()
                    .max(0);
                let verdict = if policy.allowed { "allowed" } else { "blocked" };
                warn!(
                    action = %action,
                    target = %target,
                    age_seconds,
                    verdict,
                    "replaying cached policy"
                );
                FailDecision {
                    allowed: policy.allowed,
                    reason: format!(
                        "fail-cached: replaying {age_seconds}s old decision ({verdict})"
                    ),
                    risk_score: policy.risk_score,
                }
            }
            // A miss is resolved exactly like closed mode and counted as one.
            None => {
                self.bump(FailMode::Closed);
                warn!(
                    action = %action,
                    target = %target,
                    "no cached policy, falling back to fail-closed"
                );
                FailDecision {
                    allowed: false,
                    reason: format!(
                        "fail-cached: no cached policy for {action}:{target}, falling back to fail-closed"
                    ),
                    risk_score: 100.0,
                }
            }
        }
    }

    /// Cache a decision from a successful validator call.
    pub fn cache_result(
        &self,
        action: &str,
        target: &str,
        allowed: bool,
        risk_score: f64,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        self.cache.set(action, target, allowed, risk_score, metadata);
    }

    /// Write the policy cache to disk. Called by the maintenance ticker
    /// and at shutdown.
    pub fn persist_cache(&self) {
        self.cache.persist();
    }

    /// Activation counters plus cache counters.
    pub fn stats(&self) -> FailModeStats {
        let (fail_closed, fail_cached, fail_open, last_failure) =
            self.inner.lock().map_or((0, 0, 0, None), |inner| {
                (
                    inner.fail_closed,
                    inner.fail_cached,
                    inner.fail_open,
                    inner.last_failure,
                )
            });
        FailModeStats {
            mode: self.mode,
            fail_closed,
            fail_cached,
            fail_open,
            total_failures: fail_closed
                .saturating_add(fail_cached)
                .saturating_add(fail_open),
            last_failure,
            cache: self.cache.stats(),
        }
    }

    fn bump(&self, resolved_as: FailMode) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        match resolved_as {
            FailMode::Closed => inner.fail_closed = inner.fail_closed.saturating_add(1),
            FailMode::Cached => inner.fail_cached = inner.fail_cached.saturating_add(1),
            FailMode::Open => inner.fail_open = inner.fail_open.saturating_add(1),
        }
    }
}

const fn mode_label(mode: FailMode) -> &'static str {
    match mode {
        FailMode::Closed => "closed",
        FailMode::Cached => "cached",
        FailMode::Open => "open",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000_i64.saturating_add(secs), 0).unwrap()
    }

    fn handler(mode: FailMode) -> FailModeHandler {
        FailModeHandler::new(&FailModeConfig {
            mode,
            cache: CacheConfig {
                ttl_seconds: 60,
                max_entries: 100,
                persist_path: None,
                persist_every: 100,
            },
        })
    }

    #[test]
    fn closed_blocks_at_full_risk() {
        let handler = handler(FailMode::Closed);
        let decision = handler.on_failure_at("file_read", "/etc/passwd", "timeout", t(0));
        assert!(!decision.allowed);
        assert!((decision.risk_score - 100.0).abs() < f64::EPSILON);
        assert!(decision.reason.contains("fail-closed"));
        let stats = handler.stats();
        assert_eq!(stats.fail_closed, 1);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.last_failure, Some(t(0)));
    }

    #[test]
    fn open_allows_at_zero_risk() {
        let handler = handler(FailMode::Open);
        let decision = handler.on_failure_at("shell_exec", "rm -rf /", "connection refused", t(0));
        assert!(decision.allowed);
        assert!((decision.risk_score - 0.0).abs() < f64::EPSILON);
        assert!(decision.reason.contains("fail-open"));
        assert_eq!(handler.stats().fail_open, 1);
    }

    #[test]
    fn cached_replays_a_known_decision() {
        let handler = handler(FailMode::Cached);
        handler.cache_result("file_read", "/srv/data", true, 12.5, BTreeMap::new());
        let decision = handler.on_failure("file_read", "/srv/data", "timeout");
        assert!(decision.allowed);
        assert!((decision.risk_score - 12.5).abs() < f64::EPSILON);
        assert!(decision.reason.contains("fail-cached"));
        assert!(decision.reason.contains("allowed"));
        let stats = handler.stats();
        assert_eq!(stats.fail_cached, 1);
        assert_eq!(stats.fail_closed, 0);
    }

    #[test]
    fn cached_replays_blocks_too() {
        let handler = handler(FailMode::Cached);
        handler.cache_result("db_write", "customers", false, 91.0, BTreeMap::new());
        let decision = handler.on_failure("db_write", "customers", "timeout");
        assert!(!decision.allowed);
        assert!((decision.risk_score - 91.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cached_miss_falls_back_to_closed() {
        let handler = handler(FailMode::Cached);
        let decision = handler.on_failure_at("file_read", "/never/seen", "timeout", t(0));
        assert!(!decision.allowed);
        assert!((decision.risk_score - 100.0).abs() < f64::EPSILON);
        assert!(decision.reason.contains("falling back"));
        // The fallback is counted as a closed resolution.
        let stats = handler.stats();
        assert_eq!(stats.fail_closed, 1);
        assert_eq!(stats.fail_cached, 0);
    }

    #[test]
    fn cached_entry_past_ttl_falls_back() {
        let handler = handler(FailMode::Cached);
        handler.cache.set_at("file_read", "/data", true, 5.0, BTreeMap::new(), t(0));
        // TTL is 60s; at t+60 the entry is expired.
        let decision = handler.on_failure_at("file_read", "/data", "timeout", t(60));
        assert!(!decision.allowed);
        assert_eq!(handler.stats().fail_closed, 1);
    }

    #[test]
    fn stats_aggregate_all_modes() {
        let handler = handler(FailMode::Closed);
        handler.on_failure_at("a", "x", "e", t(0));
        handler.on_failure_at("b", "y", "e", t(1));
        let stats = handler.stats();
        assert_eq!(stats.total_failures, 2);
        assert_eq!(stats.mode, FailMode::Closed);
        assert_eq!(stats.last_failure, Some(t(1)));
        assert_eq!(stats.cache.entries, 0);
    }
}
