use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids;
use crate::validate;

/// Hard cap on a requested session duration: 8 hours.
pub const MAX_DURATION: SignedDuration = SignedDuration::from_secs(8 * 3600);

/// An approval request lives for 8 hours from creation.
pub const REQUEST_TTL: SignedDuration = SignedDuration::from_secs(8 * 3600);

const JUSTIFICATION_MIN: usize = 10;
const JUSTIFICATION_MAX: usize = 500;

/// Status of an approval request. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Whether the state machine permits `self -> to`. Terminal states are
    /// absorbing.
    pub fn can_transition_to(self, to: RequestStatus) -> bool {
        matches!(self, RequestStatus::Pending) && to != RequestStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
            RequestStatus::Expired => "expired",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

/// A pending or resolved out-of-band access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub requester: String,
    pub profile: String,
    pub justification: String,
    pub duration_seconds: i64,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// TTL anchor: always `created_at + 8h`.
    pub expires_at: Timestamp,
    pub approver: Option<String>,
    pub approver_comment: Option<String>,
}

impl ApprovalRequest {
    /// Build a new pending request, validating justification and duration.
    pub fn new(
        requester: &str,
        profile: &str,
        justification: &str,
        duration: SignedDuration,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        validate::validate_profile_name(profile)?;
        validate::validate_justification(justification, JUSTIFICATION_MIN, JUSTIFICATION_MAX)?;
        if duration > MAX_DURATION || duration.is_negative() || duration.is_zero() {
            return Err(CoreError::DurationTooLong {
                max: MAX_DURATION.as_secs(),
                got: duration.as_secs(),
            });
        }

        Ok(Self {
            id: ids::new_record_id(),
            requester: requester.to_string(),
            profile: profile.to_string(),
            justification: justification.to_string(),
            duration_seconds: duration.as_secs(),
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + REQUEST_TTL,
            approver: None,
            approver_comment: None,
        })
    }

    /// True when the TTL anchor has passed, regardless of stored status.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        "2026-01-20T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn new_request_anchors_ttl_to_creation() {
        let r = ApprovalRequest::new(
            "alice",
            "prod",
            "deploying hotfix for SEV-2",
            SignedDuration::from_secs(3600),
            now(),
        )
        .unwrap();
        assert_eq!(r.status, RequestStatus::Pending);
        assert_eq!(r.expires_at, r.created_at + REQUEST_TTL);
        assert_eq!(r.id.len(), 16);
    }

    #[test]
    fn justification_window_enforced() {
        let short = ApprovalRequest::new("a", "prod", "too short", SignedDuration::from_secs(60), now());
        assert!(matches!(
            short,
            Err(CoreError::JustificationLength { got: 9, .. })
        ));

        let long = "x".repeat(501);
        assert!(ApprovalRequest::new("a", "prod", &long, SignedDuration::from_secs(60), now()).is_err());
    }

    #[test]
    fn duration_capped_at_eight_hours() {
        let r = ApprovalRequest::new(
            "alice",
            "prod",
            "needs just over the cap",
            SignedDuration::from_secs(8 * 3600 + 1),
            now(),
        );
        assert!(matches!(r, Err(CoreError::DurationTooLong { .. })));
    }

    #[test]
    fn pending_is_the_only_non_terminal_state() {
        use RequestStatus::*;
        for to in [Approved, Denied, Expired, Cancelled] {
            assert!(Pending.can_transition_to(to));
        }
        for from in [Approved, Denied, Expired, Cancelled] {
            assert!(from.is_terminal());
            for to in [Pending, Approved, Denied, Expired, Cancelled] {
                assert!(!from.can_transition_to(to));
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }
}
