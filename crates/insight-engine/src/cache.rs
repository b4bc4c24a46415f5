//! Long-lived context cache
//!
//! Owned by the host and passed by reference into each run, so snapshots
//! survive across passes instead of being refetched per call. Eviction is
//! explicit: entries expire by TTL on read and can be swept with
//! `evict_expired`.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use insight_core::{ContextSignal, ContextSnapshot};

/// Default snapshot TTL: 15 minutes.
const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// TTL cache for current context snapshots, keyed by signal
pub struct ContextCache {
    entries: DashMap<ContextSignal, (Instant, ContextSnapshot)>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// A fresh snapshot for the signal, if one is cached and unexpired
    pub fn get(&self, signal: ContextSignal) -> Option<ContextSnapshot> {
        let entry = self.entries.get(&signal)?;
        let (inserted, snapshot) = entry.value();
        if inserted.elapsed() > self.ttl {
            trace!(signal = signal.as_str(), "cached context expired");
            return None;
        }
        Some(snapshot.clone())
    }

    pub fn put(&self, snapshot: ContextSnapshot) {
        self.entries
            .insert(snapshot.signal, (Instant::now(), snapshot));
    }

    /// Drop expired entries, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() <= ttl);
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn snapshot(signal: ContextSignal) -> ContextSnapshot {
        ContextSnapshot {
            signal,
            observed_at: Utc::now(),
            values: BTreeMap::new(),
        }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = ContextCache::default();
        cache.put(snapshot(ContextSignal::Weather));
        assert!(cache.get(ContextSignal::Weather).is_some());
        assert!(cache.get(ContextSignal::Energy).is_none());
    }

    #[test]
    fn test_expired_entries_not_served() {
        let cache = ContextCache::new(Duration::ZERO);
        cache.put(snapshot(ContextSignal::Weather));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(ContextSignal::Weather).is_none());
        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ContextCache::default();
        cache.put(snapshot(ContextSignal::Weather));
        cache.put(snapshot(ContextSignal::Energy));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
