//! `UnavailableOfferingsCache`: a TTL set of `(sku, zone, capacity-type)`
//! triples known to fail (spec.md §3, §4.5).
//!
//! Process-wide, safe for concurrent reads/writes via a single `RwLock`
//! (spec.md §5: "uses a mutex or sharded map"). Never serialized to durable
//! storage. Reads are consistent-with-last-write for a single caller; the
//! cache is monotonic within a TTL window: inserting an already-present key
//! refreshes its expiry rather than shortening it.

use cloud_types::CapacityType;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default TTL for quota/capacity-driven unavailability (spec.md §3).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OfferingKey {
    pub sku: String,
    pub zone: String,
    pub capacity_type: CapacityType,
}

impl OfferingKey {
    pub fn new(sku: impl Into<String>, zone: impl Into<String>, capacity_type: CapacityType) -> Self {
        Self { sku: sku.into(), zone: zone.into(), capacity_type }
    }
}

#[derive(Clone, Copy, Debug)]
enum Expiry {
    At(Instant),
    Permanent,
}

impl Expiry {
    fn is_expired(&self, now: Instant) -> bool {
        match self {
            Expiry::At(t) => now >= *t,
            Expiry::Permanent => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct UnavailableOfferingsCache {
    entries: RwLock<HashMap<OfferingKey, Expiry>>,
}

impl UnavailableOfferingsCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Mark `key` unavailable for `ttl`. Re-inserting an existing key
    /// refreshes its expiry (spec.md §3 monotonicity invariant); it never
    /// shortens an existing permanent entry.
    pub fn mark_unavailable(&self, key: OfferingKey, ttl: Duration) {
        let mut entries = self.entries.write().expect("offerings cache lock poisoned");
        let expiry = Expiry::At(Instant::now() + ttl);
        entries
            .entry(key)
            .and_modify(|e| {
                if !matches!(e, Expiry::Permanent) {
                    *e = expiry;
                }
            })
            .or_insert(expiry);
    }

    /// Mark `key` unavailable until an explicit `flush` (hard failures that
    /// TTL expiry should not silently re-open).
    pub fn mark_permanently_unavailable(&self, key: OfferingKey) {
        let mut entries = self.entries.write().expect("offerings cache lock poisoned");
        entries.insert(key, Expiry::Permanent);
    }

    /// True if `key` is currently recorded as unavailable (not expired).
    pub fn contains(&self, key: &OfferingKey) -> bool {
        let entries = self.entries.read().expect("offerings cache lock poisoned");
        match entries.get(key) {
            Some(expiry) => !expiry.is_expired(Instant::now()),
            None => false,
        }
    }

    /// Drop all entries, regardless of TTL or permanence.
    pub fn flush(&self) {
        self.entries.write().expect("offerings cache lock poisoned").clear();
    }

    /// Drop expired entries. Not required for correctness (`contains`
    /// already treats expired entries as absent) but keeps the map bounded
    /// for long-running processes.
    pub fn reap_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().expect("offerings cache lock poisoned");
        entries.retain(|_, expiry| !expiry.is_expired(now));
    }

    #[cfg(test)]
    fn insert_with_expiry(&self, key: OfferingKey, expiry_in: Duration) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key, Expiry::At(Instant::now() + expiry_in));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sku: &str, zone: &str, ct: CapacityType) -> OfferingKey {
        OfferingKey::new(sku, zone, ct)
    }

    #[test]
    fn marks_and_reports_unavailable() {
        let cache = UnavailableOfferingsCache::new();
        let k = key("Standard_D2_v2", "1", CapacityType::Spot);
        assert!(!cache.contains(&k));
        cache.mark_unavailable(k.clone(), DEFAULT_TTL);
        assert!(cache.contains(&k));
    }

    #[test]
    fn expired_entry_is_not_reported_as_unavailable() {
        let cache = UnavailableOfferingsCache::new();
        let k = key("Standard_D2_v2", "1", CapacityType::Spot);
        cache.insert_with_expiry(k.clone(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.contains(&k));
    }

    #[test]
    fn flush_reopens_offerings() {
        let cache = UnavailableOfferingsCache::new();
        let k = key("Standard_D2_v2", "1", CapacityType::Spot);
        cache.mark_permanently_unavailable(k.clone());
        assert!(cache.contains(&k));
        cache.flush();
        assert!(!cache.contains(&k));
    }

    #[test]
    fn reinserting_refreshes_expiry_without_shortening() {
        let cache = UnavailableOfferingsCache::new();
        let k = key("Standard_D2_v2", "1", CapacityType::OnDemand);
        cache.mark_unavailable(k.clone(), Duration::from_millis(5));
        cache.mark_unavailable(k.clone(), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.contains(&k), "refreshed TTL should still be in effect");
    }

    #[test]
    fn permanent_entry_survives_ttl_remark() {
        let cache = UnavailableOfferingsCache::new();
        let k = key("Standard_D2_v2", "1", CapacityType::Spot);
        cache.mark_permanently_unavailable(k.clone());
        cache.mark_unavailable(k.clone(), Duration::from_millis(0));
        assert!(cache.contains(&k), "permanent entries are not downgraded by a TTL mark");
    }
}
