use ahash::AHasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Number of shards for the cache.
/// Must be a power of 2 for fast modulo via bitwise AND.
const NUM_SHARDS: usize = 16;

/// Longest lifetime an entry can have. Longer TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Tenant-scoped cache key.
///
/// The tenant is part of the key itself, so two tenants submitting the same
/// case fields never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tenant_id: String,
    fingerprint: String,
}

impl CacheKey {
    /// Key for a rule-based decision: payer, plan type, the first procedure
    /// code, and place of service.
    pub fn rules_decision(
        tenant_id: &str,
        payer: &str,
        plan_type: &str,
        procedure_code: &str,
        place_of_service: &str,
    ) -> Self {
        CacheKey {
            tenant_id: tenant_id.to_string(),
            fingerprint: ["rules", payer, plan_type, procedure_code, place_of_service].join(":"),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant:{}:{}", self.tenant_id, self.fingerprint)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// In-memory key/value cache with per-entry expiry.
///
/// Expiry is lazy: an expired entry is removed only when a read finds it.
/// There is no capacity bound and no single-flight: concurrent misses on the
/// same key each resolve independently and the last write wins. Entry count
/// can therefore grow between reads; [`DecisionCache::purge_expired`] is
/// available for callers that want a sweep.
pub struct DecisionCache<V> {
    shards: Vec<RwLock<HashMap<CacheKey, CacheEntry<V>>>>,
}

impl<V: Clone> DecisionCache<V> {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        DecisionCache { shards }
    }

    /// Look up a value; an expired entry is deleted and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let shard = &self.shards[self.shard_index(key)];
        let now = Instant::now();

        // Fast path: live entry under read lock
        {
            let read_guard = shard.read();
            match read_guard.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Slow path: remove the expired entry, unless it was overwritten meanwhile
        let mut write_guard = shard.write();
        match write_guard.get(key) {
            Some(entry) if entry.is_expired(now) => {
                write_guard.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store a value, replacing any existing entry.
    ///
    /// `ttl` is clamped to [`MAX_TTL`]. If the expiry still cannot be
    /// represented the value is not stored.
    pub fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        let Some(expires_at) = Instant::now().checked_add(ttl.min(MAX_TTL)) else {
            return;
        };
        let entry = CacheEntry { value, expires_at };
        let idx = self.shard_index(&key);
        self.shards[idx].write().insert(key, entry);
    }

    /// Whether an entry (live or expired) is stored for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.shards[self.shard_index(key)].read().contains_key(key)
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;

        for shard in &self.shards {
            let mut write_guard = shard.write();
            let before = write_guard.len();
            write_guard.retain(|_, entry| !entry.is_expired(now));
            purged += before - write_guard.len();
        }

        purged
    }

    #[inline]
    fn shard_index(&self, key: &CacheKey) -> usize {
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (NUM_SHARDS - 1)
    }
}

impl<V: Clone> Default for DecisionCache<V> {
    fn default() -> Self {
        DecisionCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::sleep;

    fn key(tenant: &str) -> CacheKey {
        CacheKey::rules_decision(tenant, "Aetna", "HMO", "70553", "Outpatient Center")
    }

    #[test]
    fn test_get_before_expiry() {
        let cache = DecisionCache::new();
        cache.set(key("tenant-a"), "auth_required".to_string(), Duration::from_secs(60));

        assert_eq!(cache.get(&key("tenant-a")).as_deref(), Some("auth_required"));
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let cache = DecisionCache::new();
        cache.set(key("tenant-a"), 1u32, Duration::from_millis(10));

        sleep(Duration::from_millis(30));

        // Still stored until something reads it
        assert!(cache.contains(&key("tenant-a")));
        assert_eq!(cache.get(&key("tenant-a")), None);
        assert!(!cache.contains(&key("tenant-a")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let cache = DecisionCache::new();
        cache.set(key("tenant-a"), 1u32, Duration::from_secs(u64::MAX));

        assert_eq!(cache.get(&key("tenant-a")), Some(1));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = DecisionCache::new();
        cache.set(key("tenant-a"), 1u32, Duration::from_secs(60));
        cache.set(key("tenant-a"), 2u32, Duration::from_secs(60));

        assert_eq!(cache.get(&key("tenant-a")), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_tenants_do_not_share_entries() {
        let cache = DecisionCache::new();
        cache.set(key("tenant-a"), 1u32, Duration::from_secs(60));

        assert_eq!(cache.get(&key("tenant-b")), None);
        assert_ne!(key("tenant-a"), key("tenant-b"));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            key("tenant-a").to_string(),
            "tenant:tenant-a:rules:Aetna:HMO:70553:Outpatient Center"
        );
    }

    #[test]
    fn test_purge_expired() {
        let cache = DecisionCache::new();
        cache.set(key("tenant-a"), 1u32, Duration::from_millis(5));
        cache.set(key("tenant-b"), 2u32, Duration::from_secs(60));

        sleep(Duration::from_millis(20));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("tenant-b")), Some(2));
    }

    #[test]
    fn test_concurrent_writers_last_write_wins() {
        let cache = Arc::new(DecisionCache::new());

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.set(key("tenant-a"), i, Duration::from_secs(60)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("tenant-a")).is_some());
    }
}
