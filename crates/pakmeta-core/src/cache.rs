//! In-memory key/value store with per-entry expiration.
//!
//! Expiration is lazy: an entry past its deadline is removed by the `get`
//! that observes it. [`ExpiringCache::evict_expired`] walks every key the same
//! way and can be called periodically to reclaim memory.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current time. Swappable so expiry can be tested without sleeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A stored value plus its absolute expiration instant.
///
/// `expires_at == None` means the entry lives as long as the cache does.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Option<DateTime<Utc>>,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe TTL cache guarded by a single coarse lock.
///
/// * `ttl_secs == 0` – disabled: `put` drops values, `get` and `keys` are empty.
/// * `ttl_secs < 0`  – enabled, entries never expire.
/// * `ttl_secs > 0`  – entries expire `ttl_secs` after insertion.
pub struct ExpiringCache<K, V> {
    ttl_secs: i64,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    clock: Clock,
}

impl<K, V> std::fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.lock().len();
        f.debug_struct("ExpiringCache")
            .field("ttl_secs", &self.ttl_secs)
            .field("entries", &len)
            .finish()
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl_secs: i64) -> Self {
        Self::with_clock(ttl_secs, Arc::new(Utc::now))
    }

    pub fn with_clock(ttl_secs: i64, clock: Clock) -> Self {
        Self {
            ttl_secs,
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl_secs != 0
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// Returns the expiration instant assigned to the entry, or `None` when
    /// the entry never expires or the cache is disabled. A TTL too large to
    /// represent as a deadline never expires.
    pub fn put(&self, key: K, value: V) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }

        let expires_at = if self.ttl_secs > 0 {
            let now = (self.clock)();
            TimeDelta::try_seconds(self.ttl_secs).and_then(|ttl| now.checked_add_signed(ttl))
        } else {
            None
        };

        self.lock().insert(key, CacheEntry { value, expires_at });
        expires_at
    }

    /// Return the live value for `key`, evicting it first if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }

        let now = (self.clock)();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn delete(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Keys currently stored, including ones that have expired but were not read yet.
    pub fn keys(&self) -> HashSet<K> {
        if !self.is_enabled() {
            return HashSet::new();
        }
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose deadline has passed. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        self.keys()
            .iter()
            .filter(|key| self.get(key).is_none())
            .count()
    }
}

impl<K, V> ExpiringCache<K, V> {
    // Every critical section leaves the map consistent, so a poisoned lock
    // still guards valid data.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Clock frozen at a chosen instant, advanced by hand.
    #[derive(Clone)]
    pub(crate) struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self(Arc::new(Mutex::new(Utc::now())))
        }

        pub(crate) fn advance_secs(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += TimeDelta::seconds(secs);
        }

        pub(crate) fn clock(&self) -> Clock {
            let inner = Arc::clone(&self.0);
            Arc::new(move || *inner.lock().unwrap())
        }
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let cache: ExpiringCache<String, u32> = ExpiringCache::new(0);
        assert!(!cache.is_enabled());
        assert_eq!(cache.put("a".into(), 1), None);
        assert_eq!(cache.get(&"a".into()), None);
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn positive_ttl_returns_value_until_deadline() {
        let clock = ManualClock::new();
        let cache = ExpiringCache::with_clock(10, clock.clock());

        let expires_at = cache.put("a".to_owned(), 1);
        assert!(expires_at.is_some());
        assert_eq!(cache.get(&"a".to_owned()), Some(1));

        clock.advance_secs(9);
        assert_eq!(cache.get(&"a".to_owned()), Some(1));

        clock.advance_secs(1);
        assert_eq!(cache.get(&"a".to_owned()), None);
        assert!(!cache.keys().contains("a"), "expired entry must be removed on read");
    }

    #[test]
    fn negative_ttl_never_expires() {
        let clock = ManualClock::new();
        let cache = ExpiringCache::with_clock(-1, clock.clock());

        assert_eq!(cache.put("a".to_owned(), 1), None);
        clock.advance_secs(10 * 365 * 24 * 60 * 60);
        assert_eq!(cache.get(&"a".to_owned()), Some(1));
    }

    #[test]
    fn put_replaces_value_and_deadline() {
        let clock = ManualClock::new();
        let cache = ExpiringCache::with_clock(10, clock.clock());

        cache.put("a".to_owned(), 1);
        clock.advance_secs(8);
        cache.put("a".to_owned(), 2);
        clock.advance_secs(8);
        assert_eq!(cache.get(&"a".to_owned()), Some(2));
    }

    #[test]
    fn huge_ttl_keeps_entry_without_deadline() {
        for ttl in [10_000_000_000_000_000, i64::MAX] {
            let clock = ManualClock::new();
            let cache = ExpiringCache::with_clock(ttl, clock.clock());

            assert_eq!(cache.put("a".to_owned(), 1), None, "ttl {ttl}");
            clock.advance_secs(100 * 365 * 24 * 60 * 60);
            assert_eq!(cache.get(&"a".to_owned()), Some(1), "ttl {ttl}");
        }
    }

    #[test]
    fn delete_removes_entry() {
        let cache = ExpiringCache::new(-1);
        cache.put(1u32, "one");
        cache.delete(&1);
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_expired_only_drops_stale_entries() {
        let clock = ManualClock::new();
        let cache = ExpiringCache::with_clock(5, clock.clock());

        cache.put("old".to_owned(), 1);
        clock.advance_secs(3);
        cache.put("new".to_owned(), 2);
        clock.advance_secs(3);

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.keys(), HashSet::from(["new".to_owned()]));
    }
}
