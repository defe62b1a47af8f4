use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::model::POLICY_VERSION;

/// Rate limits on break-glass creation: a cooldown between events per
/// invoker, plus per-user and per-profile quotas over a sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitPolicy {
    pub version: String,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: i64,
    #[serde(default = "default_max_per_user")]
    pub max_per_user: u32,
    #[serde(default = "default_max_per_profile")]
    pub max_per_profile: u32,
    #[serde(default = "default_quota_window")]
    pub quota_window_seconds: i64,
    /// Event count in the window past which creation logs an escalation
    /// warning. Advisory only.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
}

fn default_cooldown() -> i64 {
    300
}
fn default_max_per_user() -> u32 {
    3
}
fn default_max_per_profile() -> u32 {
    10
}
fn default_quota_window() -> i64 {
    86_400
}
fn default_escalation_threshold() -> u32 {
    5
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            cooldown_seconds: default_cooldown(),
            max_per_user: default_max_per_user(),
            max_per_profile: default_max_per_profile(),
            quota_window_seconds: default_quota_window(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

impl RateLimitPolicy {
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let policy: RateLimitPolicy = serde_yaml::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version != POLICY_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                got: self.version.clone(),
            });
        }
        for (field, value) in [
            ("cooldown_seconds", self.cooldown_seconds),
            ("quota_window_seconds", self.quota_window_seconds),
        ] {
            if value < 0 {
                return Err(PolicyError::InvalidField {
                    path: String::new(),
                    field: field.to_string(),
                    problem: "must not be negative".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> SignedDuration {
        SignedDuration::from_secs(self.cooldown_seconds)
    }

    pub fn quota_window(&self) -> SignedDuration {
        SignedDuration::from_secs(self.quota_window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_absent_fields() {
        let p = RateLimitPolicy::from_yaml("version: \"1\"\nmax_per_user: 1\n").unwrap();
        assert_eq!(p.max_per_user, 1);
        assert_eq!(p.cooldown_seconds, 300);
        assert_eq!(p.quota_window_seconds, 86_400);
        assert_eq!(p.escalation_threshold, 5);
    }

    #[test]
    fn negative_windows_rejected() {
        let err = RateLimitPolicy::from_yaml("version: \"1\"\ncooldown_seconds: -1\n");
        assert!(matches!(err, Err(PolicyError::InvalidField { .. })));
    }
}
