use jiff::SignedDuration;
use sentinel_core::models::ReasonCode;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::model::time::TimeWindow;
use crate::model::POLICY_VERSION;

/// Constraints on the emergency access path. Break-glass bypasses a policy
/// deny, so the document that governs it is deliberately restrictive:
/// empty `profiles`/`users` lists mean nobody, not everybody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakGlassPolicy {
    pub version: String,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub allowed_reason_codes: Vec<ReasonCode>,
    #[serde(default)]
    pub time: Option<TimeWindow>,
    /// Cap on an event's duration, at most the 4h hard limit.
    #[serde(default)]
    pub max_duration_seconds: Option<i64>,
}

impl BreakGlassPolicy {
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let policy: BreakGlassPolicy = serde_yaml::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version != POLICY_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                got: self.version.clone(),
            });
        }
        if let Some(time) = &self.time {
            time.validate()?;
        }
        let hard_cap = sentinel_core::models::breakglass::MAX_DURATION.as_secs();
        if let Some(max) = self.max_duration_seconds {
            if max <= 0 || max > hard_cap {
                return Err(PolicyError::InvalidField {
                    path: String::new(),
                    field: "max_duration_seconds".to_string(),
                    problem: format!("must be 1..={hard_cap}"),
                });
            }
        }
        Ok(())
    }

    pub fn allows_user(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }

    pub fn allows_profile(&self, profile: &str) -> bool {
        self.profiles.iter().any(|p| p == profile)
    }

    pub fn allows_reason(&self, reason: ReasonCode) -> bool {
        self.allowed_reason_codes.contains(&reason)
    }

    /// Effective duration cap: the configured cap, or the 4h hard limit.
    pub fn max_duration(&self) -> SignedDuration {
        self.max_duration_seconds
            .map(SignedDuration::from_secs)
            .unwrap_or(sentinel_core::models::breakglass::MAX_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lists_mean_nobody() {
        let p = BreakGlassPolicy::from_yaml("version: \"1\"\n").unwrap();
        assert!(!p.allows_user("alice"));
        assert!(!p.allows_profile("prod"));
        assert!(!p.allows_reason(ReasonCode::Incident));
    }

    #[test]
    fn configured_lists_are_exact_membership() {
        let p = BreakGlassPolicy::from_yaml(
            r#"
version: "1"
profiles: [prod]
users: [alice]
allowed_reason_codes: [incident, security]
max_duration_seconds: 3600
"#,
        )
        .unwrap();
        assert!(p.allows_user("alice") && !p.allows_user("bob"));
        assert!(p.allows_profile("prod") && !p.allows_profile("dev"));
        assert!(p.allows_reason(ReasonCode::Incident));
        assert!(!p.allows_reason(ReasonCode::Maintenance));
        assert_eq!(p.max_duration(), SignedDuration::from_secs(3600));
    }

    #[test]
    fn max_duration_cannot_exceed_hard_cap() {
        let err = BreakGlassPolicy::from_yaml(
            "version: \"1\"\nmax_duration_seconds: 14401\n",
        );
        assert!(matches!(err, Err(PolicyError::InvalidField { .. })));
    }
}
