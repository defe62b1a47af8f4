use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// Status of a server-mode session. Once revoked or expired, the credential
/// server must refuse every subsequent fetch for this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Revoked,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        matches!(self, SessionStatus::Active) && to != SessionStatus::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Revoked => "revoked",
            SessionStatus::Expired => "expired",
        }
    }
}

/// A server-mode session record: one row per issuance served by the local
/// credential server, enabling per-request revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSession {
    pub id: String,
    pub user: String,
    pub profile: String,
    pub status: SessionStatus,
    pub started_at: Timestamp,
    pub last_access_at: Timestamp,
    /// Authoritative TTL: past this instant the session is expired even if
    /// the stored status still says active.
    pub expires_at: Timestamp,
    pub request_count: i64,
    pub server_instance_id: String,
    pub source_identity: String,
}

impl ServerSession {
    pub fn new(
        id: &str,
        user: &str,
        profile: &str,
        source_identity: &str,
        server_instance_id: &str,
        duration: SignedDuration,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.to_string(),
            user: user.to_string(),
            profile: profile.to_string(),
            status: SessionStatus::Active,
            started_at: now,
            last_access_at: now,
            expires_at: now + duration,
            request_count: 0,
            server_instance_id: server_instance_id.to_string(),
            source_identity: source_identity.to_string(),
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// The status readers must act on: a TTL-expired row still marked
    /// active is treated as expired for authorization purposes.
    pub fn effective_status(&self, now: Timestamp) -> SessionStatus {
        if self.status == SessionStatus::Active && self.is_expired(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_overrides_stored_active_status() {
        let start: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        let s = ServerSession::new(
            "0011223344556677",
            "alice",
            "prod",
            "sentinel:alice:direct:a1b2c3d4",
            "srv-1",
            SignedDuration::from_secs(3600),
            start,
        );

        assert_eq!(s.effective_status(start), SessionStatus::Active);
        let later = start + SignedDuration::from_secs(3600);
        assert_eq!(s.effective_status(later), SessionStatus::Expired);
    }

    #[test]
    fn revoked_and_expired_absorb() {
        use SessionStatus::*;
        assert!(Active.can_transition_to(Revoked));
        assert!(Active.can_transition_to(Expired));
        assert!(!Revoked.can_transition_to(Active));
        assert!(!Revoked.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Revoked));
    }
}
