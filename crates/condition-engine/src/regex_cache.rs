//! Bounded LRU regex cache with per-pattern timeout for ReDoS resistance.
//!
//! Patterns compile to [`regex::Regex`], whose automaton-based engine runs
//! in time linear in the input (no catastrophic backtracking is possible by
//! construction). The per-call timeout below is a second line of defense
//! against pathologically large inputs rather than a backtracking bailout —
//! see DESIGN.md for the reasoning.

use crate::error::{ConditionError, Result};
use dashmap::DashMap;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Patterns longer than this are rejected outright.
pub const MAX_PATTERN_LEN: usize = 1_000;

/// Default cache capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Cap on how many entries a single eviction pass removes.
const MAX_EVICTION_BATCH: usize = 100;

struct CacheEntry {
    regex: Regex,
    last_access_nanos: AtomicU64,
}

/// A bounded, concurrency-safe cache of compiled regex patterns.
///
/// Insertion beyond `max_entries` triggers eviction of the oldest ~25% of
/// entries (capped at [`MAX_EVICTION_BATCH`]) by last-access time.
pub struct RegexCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    max_entries: usize,
    created_at: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RegexCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with an explicit maximum entry count.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            created_at: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cumulative (hits, misses) since this cache was created, for
    /// per-evaluation metrics that diff a before/after reading.
    pub fn hit_miss_counts(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Current number of cached patterns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the cache holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn now_nanos(&self) -> u64 {
        self.created_at.elapsed().as_nanos() as u64
    }

    /// Compile (or fetch) `pattern`, then match it against `text` within
    /// `budget`. A budget that elapses mid-match fails with
    /// [`ConditionError::RegexTimeout`].
    pub fn is_match(&self, pattern: &str, text: &str, budget: Duration) -> Result<bool> {
        let entry = self.get_or_compile(pattern)?;
        entry.last_access_nanos.store(self.now_nanos(), Ordering::Relaxed);
        run_with_timeout(entry, text.to_string(), budget)
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Arc<CacheEntry>> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(ConditionError::RegexComplexity {
                len: pattern.len(),
                max: MAX_PATTERN_LEN,
            });
        }

        if let Some(entry) = self.entries.get(pattern) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let regex = Regex::new(pattern).map_err(|e| ConditionError::RegexInvalid(e.to_string()))?;
        let entry = Arc::new(CacheEntry {
            regex,
            last_access_nanos: AtomicU64::new(self.now_nanos()),
        });

        self.entries.insert(pattern.to_string(), entry.clone());
        self.maybe_evict();
        Ok(entry)
    }

    /// Evict the oldest ~25% of entries (capped at [`MAX_EVICTION_BATCH`])
    /// if the cache has grown past its configured maximum. Eviction runs
    /// under concurrent insertion, so the cache may briefly exceed
    /// `max_entries` by more than one entry during a race — bounded by the
    /// eviction batch size.
    fn maybe_evict(&self) {
        let len = self.entries.len();
        if len <= self.max_entries {
            return;
        }

        let target_evictions = (len / 4).clamp(1, MAX_EVICTION_BATCH);

        let mut by_age: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|r| (r.key().clone(), r.value().last_access_nanos.load(Ordering::Relaxed)))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);

        for (key, _) in by_age.into_iter().take(target_evictions) {
            self.entries.remove(&key);
        }
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a match on a dedicated thread and enforce `budget` via a channel
/// timeout, so a pathological input can't stall the evaluator past its
/// regex-timeout budget.
fn run_with_timeout(entry: Arc<CacheEntry>, text: String, budget: Duration) -> Result<bool> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let matched = entry.regex.is_match(&text);
        let _ = tx.send(matched);
    });

    match rx.recv_timeout(budget) {
        Ok(matched) => Ok(matched),
        Err(_) => Err(ConditionError::RegexTimeout {
            limit_ms: budget.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_matches() {
        let cache = RegexCache::new();
        assert!(cache
            .is_match(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$", "test@example.com", Duration::from_millis(100))
            .unwrap());
        assert!(!cache
            .is_match(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$", "not-an-email", Duration::from_millis(100))
            .unwrap());
    }

    #[test]
    fn pattern_too_long_rejected() {
        let cache = RegexCache::new();
        let pattern = "a".repeat(MAX_PATTERN_LEN + 1);
        let err = cache.is_match(&pattern, "x", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ConditionError::RegexComplexity { .. }));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let cache = RegexCache::new();
        let err = cache.is_match("(unclosed", "x", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ConditionError::RegexInvalid(_)));
    }

    #[test]
    fn repeated_pattern_is_cached() {
        let cache = RegexCache::new();
        cache.is_match("^a+$", "aaa", Duration::from_millis(50)).unwrap();
        cache.is_match("^a+$", "aaa", Duration::from_millis(50)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hit_and_miss_counts_are_tracked() {
        let cache = RegexCache::new();
        cache.is_match("^a+$", "aaa", Duration::from_millis(50)).unwrap();
        let (hits, misses) = cache.hit_miss_counts();
        assert_eq!((hits, misses), (0, 1));
        cache.is_match("^a+$", "aaa", Duration::from_millis(50)).unwrap();
        let (hits, misses) = cache.hit_miss_counts();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn eviction_keeps_cache_near_capacity() {
        let cache = RegexCache::with_capacity(4);
        for i in 0..20 {
            let pattern = format!("^pattern{i}$");
            cache.is_match(&pattern, "x", Duration::from_millis(50)).unwrap();
        }
        // Cache never grows unboundedly; it stays within a small multiple of
        // its configured capacity even under continuous insertion pressure.
        assert!(cache.len() <= 8, "cache grew to {} entries", cache.len());
    }
}
