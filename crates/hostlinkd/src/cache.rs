//! Time-bounded memoisation for expensive scene queries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::HOST_TARGET;

/// Lifetime applied when [`TtlCache::insert`] is given no explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// String-keyed cache whose entries expire after a per-entry TTL.
///
/// Expired entries are evicted lazily when read.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    entries: HashMap<String, Entry<V>>,
    default_ttl: Duration,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }
}

impl<V> TtlCache<V> {
    /// An empty cache with the given fallback TTL.
    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    /// Returns the live value for `key`, evicting it if it has expired.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        if self.entries.get(key).is_some_and(Entry::is_expired) {
            debug!(target: HOST_TARGET, key, "cache entry expired");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Stores `value` under `key` for `ttl`, or the default TTL.
    pub fn insert(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            created_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.entries.insert(key.into(), entry);
    }

    /// Drops entries whose key contains `pattern`, or every entry when
    /// `pattern` is `None`. Returns how many were dropped.
    pub fn invalidate(&mut self, pattern: Option<&str>) -> usize {
        let before = self.entries.len();
        match pattern {
            None => self.entries.clear(),
            Some(pattern) => self.entries.retain(|key, _| !key.contains(pattern)),
        }
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(target: HOST_TARGET, ?pattern, dropped, "cache invalidated");
        }
        dropped
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
