//! In-process policy cache.
//!
//! One slot per parameter path. A slot's async mutex doubles as the
//! single-flight guard: concurrent misses on the same path queue behind
//! one loader, while loads for different paths never contend. Expiry is
//! lazy — an expired entry is replaced on the next access, and a failed
//! refresh is an error, never a stale serve.
//!
//! The cache is the process's only global mutable state. Tests call
//! [`flush`] between cases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use jiff::{SignedDuration, Timestamp};

use crate::model::{AccessPolicy, ApprovalPolicy, BreakGlassPolicy, RateLimitPolicy};

/// How long a cached policy stays fresh.
pub const POLICY_CACHE_TTL: SignedDuration = SignedDuration::from_secs(300);

/// A parsed document of any of the four policy types.
#[derive(Debug, Clone)]
pub enum CachedPolicy {
    Access(Arc<AccessPolicy>),
    Approval(Arc<ApprovalPolicy>),
    BreakGlass(Arc<BreakGlassPolicy>),
    RateLimit(Arc<RateLimitPolicy>),
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// SSM parameter version the document was fetched at.
    pub version: i64,
    pub fetched_at: Timestamp,
    pub doc: CachedPolicy,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        now < self.fetched_at + POLICY_CACHE_TTL
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CacheEntry>>>;

#[derive(Default)]
pub struct PolicyCache {
    slots: Mutex<HashMap<String, Slot>>,
}

static GLOBAL: OnceLock<PolicyCache> = OnceLock::new();

impl PolicyCache {
    /// The process-wide cache instance.
    pub fn global() -> &'static PolicyCache {
        GLOBAL.get_or_init(PolicyCache::default)
    }

    /// The slot for a path. The map lock is held only long enough to clone
    /// the slot handle; loaders then serialize on the slot itself.
    pub fn slot(&self, path: &str) -> Slot {
        let mut slots = self.slots.lock().expect("policy cache poisoned");
        slots.entry(path.to_string()).or_default().clone()
    }

    /// Drop every cached entry.
    pub fn flush(&self) {
        self.slots.lock().expect("policy cache poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fetched_at: Timestamp) -> CacheEntry {
        CacheEntry {
            version: 1,
            fetched_at,
            doc: CachedPolicy::RateLimit(Arc::new(RateLimitPolicy::default())),
        }
    }

    #[test]
    fn freshness_is_five_minutes_exclusive() {
        let t0: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        let e = entry(t0);
        assert!(e.is_fresh(t0));
        assert!(e.is_fresh(t0 + SignedDuration::from_secs(299)));
        assert!(!e.is_fresh(t0 + POLICY_CACHE_TTL));
    }

    #[tokio::test]
    async fn same_path_shares_a_slot_distinct_paths_do_not() {
        let cache = PolicyCache::default();
        let a1 = cache.slot("/sentinel/access");
        let a2 = cache.slot("/sentinel/access");
        let b = cache.slot("/sentinel/ratelimit");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[tokio::test]
    async fn flush_empties_slots() {
        let cache = PolicyCache::default();
        let t0: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        *cache.slot("/p").lock().await = Some(entry(t0));
        cache.flush();
        assert!(cache.slot("/p").lock().await.is_none());
    }
}
