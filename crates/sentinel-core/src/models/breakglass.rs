use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids;
use crate::validate;

/// Break-glass sessions are time-boxed harder than normal issuance: 4 hours.
pub const MAX_DURATION: SignedDuration = SignedDuration::from_secs(4 * 3600);

const JUSTIFICATION_MIN: usize = 20;
const JUSTIFICATION_MAX: usize = 1000;

/// Why the glass was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Incident,
    Maintenance,
    Security,
    Recovery,
    Other,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Incident => "incident",
            ReasonCode::Maintenance => "maintenance",
            ReasonCode::Security => "security",
            ReasonCode::Recovery => "recovery",
            ReasonCode::Other => "other",
        }
    }
}

impl std::str::FromStr for ReasonCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incident" => Ok(ReasonCode::Incident),
            "maintenance" => Ok(ReasonCode::Maintenance),
            "security" => Ok(ReasonCode::Security),
            "recovery" => Ok(ReasonCode::Recovery),
            "other" => Ok(ReasonCode::Other),
            _ => Err(CoreError::InvalidReasonCode(s.to_string())),
        }
    }
}

/// Status of a break-glass event. `Active -> {Expired, Closed}`; terminal
/// states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakGlassStatus {
    Active,
    Expired,
    Closed,
}

impl BreakGlassStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BreakGlassStatus::Active)
    }

    pub fn can_transition_to(self, to: BreakGlassStatus) -> bool {
        matches!(self, BreakGlassStatus::Active) && to != BreakGlassStatus::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreakGlassStatus::Active => "active",
            BreakGlassStatus::Expired => "expired",
            BreakGlassStatus::Closed => "closed",
        }
    }
}

/// An emergency access event. Bypasses a policy deny, but is logged,
/// rate-limited, and bound into the SourceIdentity via `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakGlassEvent {
    pub id: String,
    pub invoker: String,
    pub profile: String,
    pub reason_code: ReasonCode,
    pub justification: String,
    pub duration_seconds: i64,
    pub status: BreakGlassStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
    /// The request id stamped into this event's SourceIdentity.
    pub request_id: String,
    pub closed_by: Option<String>,
    pub closed_reason: Option<String>,
}

impl BreakGlassEvent {
    pub fn new(
        invoker: &str,
        profile: &str,
        reason_code: ReasonCode,
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
            invoker: invoker.to_string(),
            profile: profile.to_string(),
            reason_code,
            justification: justification.to_string(),
            duration_seconds: duration.as_secs(),
            status: BreakGlassStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: now + duration,
            request_id: ids::new_request_id(),
            closed_by: None,
            closed_reason: None,
        })
    }

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
    fn new_event_is_active_with_bound_request_id() {
        let ev = BreakGlassEvent::new(
            "alice",
            "prod",
            ReasonCode::Incident,
            "SEV-1: api fleet is down, need prod access",
            SignedDuration::from_secs(1800),
            now(),
        )
        .unwrap();
        assert_eq!(ev.status, BreakGlassStatus::Active);
        assert_eq!(ev.request_id.len(), 8);
        assert_eq!(ev.expires_at, ev.created_at + SignedDuration::from_secs(1800));
    }

    #[test]
    fn justification_window_is_wider_but_still_bounded() {
        let err = BreakGlassEvent::new(
            "alice",
            "prod",
            ReasonCode::Other,
            "too short",
            SignedDuration::from_secs(60),
            now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn duration_capped_at_four_hours() {
        let err = BreakGlassEvent::new(
            "alice",
            "prod",
            ReasonCode::Incident,
            "a justification that is long enough to pass",
            SignedDuration::from_secs(4 * 3600 + 1),
            now(),
        );
        assert!(matches!(err, Err(CoreError::DurationTooLong { .. })));
    }

    #[test]
    fn terminal_states_absorb() {
        use BreakGlassStatus::*;
        assert!(Active.can_transition_to(Expired));
        assert!(Active.can_transition_to(Closed));
        assert!(!Expired.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Expired));
    }
}
