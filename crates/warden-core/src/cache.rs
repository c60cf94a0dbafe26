//! Policy cache backing the `cached` fail mode.
//!
//! Stores recent validator decisions keyed by `"{action}::{target}"` so a
//! validator outage can replay known-good answers instead of failing open.
//! Every entry carries a truncated SHA-256 over its own fields; a mismatch
//! on read means the entry (in memory or on disk) was altered and it is
//! discarded as a miss.
//!
//! The cache persists itself as a JSON array, both on a fixed insert cadence
//! and when [`PolicyCache::persist`] is called. A corrupt or missing cache
//! file is a warning, never an error: the cache is an optimization and the
//! fail-mode handler degrades to closed without it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use warden_types::CachedPolicy;

use crate::config::CacheConfig;

/// Hash over a cached decision's own fields, sixteen hex characters.
///
/// Covers action, target, verdict, risk (one decimal), and the caching
/// instant, so flipping any field invalidates the entry.
#[must_use]
pub fn integrity_hash(
    action: &str,
    target: &str,
    allowed: bool,
    risk_score: f64,
    cached_at: DateTime<Utc>,
) -> String {
    let data = format!(
        "{action}:{target}:{allowed}:{risk_score:.1}:{}",
        cached_at.to_rfc3339()
    );
    let mut hash = hex::encode(Sha256::digest(data.as_bytes()));
    hash.truncate(16);
    hash
}

/// Whether a cached decision still matches its recorded hash.
#[must_use]
pub fn verify_integrity(policy: &CachedPolicy) -> bool {
    policy.integrity_hash
        == integrity_hash(
            &policy.action,
            &policy.target,
            policy.allowed,
            policy.risk_score,
            policy.cached_at,
        )
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Thread-safe TTL cache of validator decisions.
pub struct PolicyCache {
    /// Seconds a cached decision stays replayable.
    ttl_seconds: u64,
    /// Capacity bound; exceeding it evicts the oldest tenth.
    max_entries: usize,
    /// Persistence target. `None` disables persistence entirely.
    persist_path: Option<PathBuf>,
    /// Persist whenever the entry count is a multiple of this after a set.
    persist_every: usize,
    /// Entries and hit counters.
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: BTreeMap<String, CachedPolicy>,
    hits: u64,
    misses: u64,
}

/// Counters returned by [`PolicyCache::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Hits as a percentage of all lookups, rounded to one decimal.
    pub hit_rate: f64,
    /// Configured capacity bound.
    pub max_entries: usize,
    /// Configured TTL in seconds.
    pub ttl_seconds: u64,
}

impl PolicyCache {
    /// Create a cache and load any persisted entries.
    ///
    /// Persisted entries that are expired or fail integrity verification
    /// are dropped during the load.
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Self {
            ttl_seconds: config.ttl_seconds,
            max_entries: config.max_entries,
            persist_path: config.persist_path.clone(),
            persist_every: config.persist_every,
            inner: Mutex::new(CacheInner::default()),
        };
        cache.load_from_disk();
        cache
    }

    /// Look up a decision, as of now.
    pub fn get(&self, action: &str, target: &str) -> Option<CachedPolicy> {
        self.get_at(action, target, Utc::now())
    }

    /// Look up a decision as of an explicit instant.
    ///
    /// An expired or tampered entry is removed and counted as a miss.
    pub fn get_at(&self, action: &str, target: &str, now: DateTime<Utc>) -> Option<CachedPolicy> {
        let key = make_key(action, target);
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };

        let Some(policy) = inner.entries.get(&key).cloned() else {
            inner.misses = inner.misses.saturating_add(1);
            return None;
        };

        if policy.is_expired_at(now) {
            inner.entries.remove(&key);
            inner.misses = inner.misses.saturating_add(1);
            debug!(action = %action, target = %target, "cached policy expired");
            return None;
        }

        if !verify_integrity(&policy) {
            inner.entries.remove(&key);
            inner.misses = inner.misses.saturating_add(1);
            warn!(action = %action, target = %target, "cached policy failed integrity check");
            return None;
        }

        inner.hits = inner.hits.saturating_add(1);
        Some(policy)
    }

    /// Store a decision, as of now.
    pub fn set(
        &self,
        action: &str,
        target: &str,
        allowed: bool,
        risk_score: f64,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        self.set_at(action, target, allowed, risk_score, metadata, Utc::now());
    }

    /// Store a decision as of an explicit instant.
    pub fn set_at(
        &self,
        action: &str,
        target: &str,
        allowed: bool,
        risk_score: f64,
        metadata: BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        let expires_at = now
            .checked_add_signed(Duration::seconds(
                i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX),
            ))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let policy = CachedPolicy {
            action: action.to_owned(),
            target: target.to_owned(),
            allowed,
            risk_score,
            cached_at: now,
            expires_at,
            integrity_hash: integrity_hash(action, target, allowed, risk_score, now),
            metadata,
        };

        let should_persist = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            inner.entries.insert(make_key(action, target), policy);
            if inner.entries.len() > self.max_entries {
                evict_oldest(&mut inner.entries);
            }
            inner
                .entries
                .len()
                .checked_rem(self.persist_every)
                .is_some_and(|rem| rem == 0)
        };

        if should_persist {
            self.persist();
        }
    }

    /// Invalidate entries.
    ///
    /// Both arguments select one key; one argument selects every entry
    /// matching that field; neither clears the cache. Returns how many
    /// entries were removed.
    pub fn invalidate(&self, action: Option<&str>, target: Option<&str>) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let removed = match (action, target) {
            (None, None) => {
                let removed = inner.entries.len();
                inner.entries.clear();
                info!("policy cache cleared");
                removed
            }
            (Some(action), Some(target)) => {
                usize::from(inner.entries.remove(&make_key(action, target)).is_some())
            }
            (Some(action), None) => {
                let before = inner.entries.len();
                inner.entries.retain(|_, p| p.action != action);
                before.saturating_sub(inner.entries.len())
            }
            (None, Some(target)) => {
                let before = inner.entries.len();
                inner.entries.retain(|_, p| p.target != target);
                before.saturating_sub(inner.entries.len())
            }
        };
        if removed > 0 {
            info!(removed, "invalidated cached policies");
        }
        removed
    }

    /// Hit counters and capacity settings.
    pub fn stats(&self) -> CacheStats {
        let Ok(inner) = self.inner.lock() else {
            return CacheStats {
                entries: 0,
                hits: 0,
                misses: 0,
                hit_rate: 0.0,
                max_entries: self.max_entries,
                ttl_seconds: self.ttl_seconds,
            };
        };
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: hit_rate(inner.hits, inner.misses),
            max_entries: self.max_entries,
            ttl_seconds: self.ttl_seconds,
        }
    }

    /// Write all unexpired entries to the persistence path, if one is set.
    ///
    /// Failures are logged as warnings; persistence is best effort.
    pub fn persist(&self) {
        self.persist_at(Utc::now());
    }

    /// Persistence as of an explicit instant.
    pub fn persist_at(&self, now: DateTime<Utc>) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let entries: Vec<CachedPolicy> = {
            let Ok(inner) = self.inner.lock() else {
                return;
            };
            inner
                .entries
                .values()
                .filter(|p| !p.is_expired_at(now))
                .cloned()
                .collect()
        };
        match serde_json::to_vec(&entries) {
            Ok(bytes) => match std::fs::write(path, bytes) {
                Ok(()) => {
                    debug!(path = %path.display(), entries = entries.len(), "policy cache persisted");
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "could not persist policy cache");
                }
            },
            Err(error) => {
                warn!(%error, "could not serialize policy cache");
            }
        }
    }

    fn load_from_disk(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        if !path.exists() {
            return;
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(path = %path.display(), %error, "could not read policy cache");
                return;
            }
        };
        let entries: Vec<CachedPolicy> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(path = %path.display(), %error, "could not parse policy cache");
                return;
            }
        };

        let now = Utc::now();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        for policy in entries {
            if !policy.is_expired_at(now) && verify_integrity(&policy) {
                inner
                    .entries
                    .insert(make_key(&policy.action, &policy.target), policy);
            }
        }
        info!(
            path = %path.display(),
            entries = inner.entries.len(),
            "loaded persisted policy cache"
        );
    }
}

fn make_key(action: &str, target: &str) -> String {
    format!("{action}::{target}")
}

/// Remove the oldest tenth of the cache by caching instant.
fn evict_oldest(entries: &mut BTreeMap<String, CachedPolicy>) {
    let mut by_age: Vec<(DateTime<Utc>, String)> = entries
        .iter()
        .map(|(key, policy)| (policy.cached_at, key.clone()))
        .collect();
    by_age.sort();
    let remove_count = entries.len() / 10;
    for (_, key) in by_age.into_iter().take(remove_count) {
        entries.remove(&key);
    }
    debug!(removed = remove_count, "evicted oldest cached policies");
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits.saturating_add(misses);
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = hits as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}
