//! Per-session credential cache with single-flight minting.
//!
//! Each session id owns a slot; a fetch that needs to mint holds the
//! slot's async mutex for the duration of the STS call, so concurrent
//! misses on the same session produce exactly one mint while other
//! sessions proceed untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jiff::Timestamp;
use sentinel_core::models::Credentials;

/// Refresh margin: mint anew once cached credentials are within a minute
/// of expiry.
pub const REFRESH_MARGIN_SECONDS: i64 = 60;

pub type Slot = Arc<tokio::sync::Mutex<Option<Credentials>>>;

#[derive(Default)]
pub struct CredentialCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl CredentialCache {
    pub fn slot(&self, session_id: &str) -> Slot {
        let mut slots = self.slots.lock().expect("credential cache poisoned");
        slots.entry(session_id.to_string()).or_default().clone()
    }

    /// Drop cached credentials for one session (revocation hygiene).
    pub fn evict(&self, session_id: &str) {
        self.slots
            .lock()
            .expect("credential cache poisoned")
            .remove(session_id);
    }
}

/// Whether a cached value can still be served at `now`.
pub fn still_usable(credentials: &Credentials, now: Timestamp) -> bool {
    credentials.seconds_remaining(now) > REFRESH_MARGIN_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expiration: &str) -> Credentials {
        Credentials {
            access_key_id: "ASIAX".to_string(),
            secret_access_key: "s".to_string(),
            session_token: "t".to_string(),
            expiration: expiration.parse().unwrap(),
        }
    }

    #[test]
    fn refresh_margin_is_sixty_seconds() {
        let now: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        assert!(still_usable(&creds("2026-01-20T12:01:01Z"), now));
        assert!(!still_usable(&creds("2026-01-20T12:01:00Z"), now));
        assert!(!still_usable(&creds("2026-01-20T11:00:00Z"), now));
    }

    #[tokio::test]
    async fn one_slot_per_session() {
        let cache = CredentialCache::default();
        let a = cache.slot("sess-a");
        let a_again = cache.slot("sess-a");
        let b = cache.slot("sess-b");
        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));

        cache.evict("sess-a");
        let fresh = cache.slot("sess-a");
        assert!(!Arc::ptr_eq(&a, &fresh));
    }
}
