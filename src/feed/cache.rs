//! Per-session feed response cache

use std::collections::HashMap;
use std::time::{Duration, Instant};
use toolpin_version::ReleaseCandidate;

/// Default time-to-live for cached feed responses
pub const DEFAULT_FEED_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    candidates: Vec<ReleaseCandidate>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Parsed feed responses keyed by source URL
#[derive(Debug)]
pub struct FeedCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_TTL)
    }
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<ReleaseCandidate>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<Vec<ReleaseCandidate>> {
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.candidates.clone());

        match fresh {
            Some(candidates) => {
                self.stats.hits += 1;
                Some(candidates)
            }
            None => {
                self.entries.remove(key);
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, candidates: Vec<ReleaseCandidate>) {
        self.insert_at(key, candidates, Instant::now());
    }

    pub fn insert_at(&mut self, key: impl Into<String>, candidates: Vec<ReleaseCandidate>, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                fetched_at: now,
                candidates,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_then_expire() {
        let mut cache = FeedCache::new(Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at("k", vec![ReleaseCandidate::stable("1.0.0")], start);

        assert_eq!(cache.get_at("k", start + Duration::from_secs(59)).unwrap().len(), 1);
        assert!(cache.get_at("k", start + Duration::from_secs(60)).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let mut cache = FeedCache::new(Duration::ZERO);
        cache.insert("k", Vec::new());
        assert!(cache.get("k").is_none());
    }
}
