//! Append-only, capped histories.
//!
//! The supervisor keeps two of these: one for breach findings and one for
//! containment reports. Entries are never mutated after insertion; when
//! the cap is reached the oldest entries fall off, but the running total
//! keeps counting so fleet statistics stay honest after rotation.

/// Maximum entries a history retains.
pub const MAX_HISTORY: usize = 500;

/// A bounded, newest-first log.
#[derive(Debug, Clone, Default)]
pub struct CappedLog<T> {
    /// Retained entries, newest first.
    entries: Vec<T>,
    /// Entries ever pushed, including rotated-out ones.
    total: u64,
}

impl<T: Clone> CappedLog<T> {
    /// Create an empty log.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
        }
    }

    /// Append an entry, rotating out the oldest past [`MAX_HISTORY`].
    pub fn push(&mut self, entry: T) {
        self.entries.insert(0, entry);
        if self.entries.len() > MAX_HISTORY {
            self.entries.truncate(MAX_HISTORY);
        }
        self.total = self.total.saturating_add(1);
    }

    /// Up to `limit` retained entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// Every retained entry, newest first.
    pub fn all(&self) -> &[T] {
        &self.entries
    }

    /// Entries ever pushed, including ones the cap rotated out.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn newest_entries_come_first() {
        let mut log = CappedLog::new();
        log.push(1u32);
        log.push(2);
        log.push(3);
        assert_eq!(log.recent(2), vec![3, 2]);
        assert_eq!(log.all(), &[3, 2, 1]);
    }

    #[test]
    fn cap_rotates_but_total_keeps_counting() {
        let mut log = CappedLog::new();
        for i in 0..600u32 {
            log.push(i);
        }
        assert_eq!(log.len(), MAX_HISTORY);
        assert_eq!(log.total(), 600);
        // The newest survives; the oldest has rotated out.
        assert_eq!(log.all().first(), Some(&599));
        assert!(!log.all().contains(&0));
    }

    #[test]
    fn recent_tolerates_oversized_limits() {
        let mut log = CappedLog::new();
        log.push("only");
        assert_eq!(log.recent(10_000).len(), 1);
        assert!(!log.is_empty());
    }
}
