use sentinel_core::models::Effect;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::model::time::TimeWindow;
use crate::model::POLICY_VERSION;

/// An access policy: an ordered list of rules, evaluated first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessPolicy {
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// One rule. A rule matches when every present condition matches; absent
/// conditions match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub name: String,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Option<Conditions>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conditions {
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub time: Option<TimeWindow>,
    #[serde(default)]
    pub require_server_session: Option<bool>,
    #[serde(default)]
    pub mdm: Option<MdmConditions>,
}

/// Device-posture predicates resolved through the MDM provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MdmConditions {
    #[serde(default)]
    pub compliant: Option<bool>,
    #[serde(default)]
    pub enrolled: Option<bool>,
}

impl MdmConditions {
    pub fn is_empty(&self) -> bool {
        self.compliant.is_none() && self.enrolled.is_none()
    }
}

impl AccessPolicy {
    /// Parse from YAML and validate. The only way a policy should enter
    /// the system.
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let policy: AccessPolicy = serde_yaml::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version != POLICY_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                got: self.version.clone(),
            });
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(PolicyError::InvalidField {
                    path: String::new(),
                    field: format!("rules[{i}].name"),
                    problem: "must not be empty".to_string(),
                });
            }
            if let Some(time) = rule.conditions.as_ref().and_then(|c| c.time.as_ref()) {
                time.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_policy_parses() {
        let policy = AccessPolicy::from_yaml(
            r#"
version: "1"
rules:
  - name: business-hours-dev
    effect: allow
    conditions:
      profiles: [dev, staging]
      users: [alice, bob]
      time:
        days: [monday, tuesday, wednesday, thursday, friday]
        hours: { start: "09:00", end: "18:00" }
        timezone: America/New_York
    reason: weekday working hours
  - name: prod-needs-approval
    effect: require_approval
    conditions:
      profiles: [prod]
  - name: default-deny
    effect: deny
"#,
        )
        .unwrap();

        assert_eq!(policy.rules.len(), 3);
        assert_eq!(policy.rules[0].effect, Effect::Allow);
        assert_eq!(policy.rules[1].effect, Effect::RequireApproval);
        assert_eq!(
            policy.rules[0].conditions.as_ref().unwrap().profiles,
            vec!["dev", "staging"]
        );
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = AccessPolicy::from_yaml(
            "version: \"1\"\nrules:\n  - name: a\n    effect: allow\n    efect_typo: deny\n",
        );
        assert!(matches!(err, Err(PolicyError::Yaml(_))));
    }

    #[test]
    fn unknown_effect_rejected() {
        let err = AccessPolicy::from_yaml(
            "version: \"1\"\nrules:\n  - name: a\n    effect: permit\n",
        );
        assert!(matches!(err, Err(PolicyError::Yaml(_))));
    }

    #[test]
    fn version_must_be_one() {
        let err = AccessPolicy::from_yaml("version: \"2\"\nrules: []\n");
        assert!(matches!(err, Err(PolicyError::UnsupportedVersion { .. })));
    }

    #[test]
    fn nested_time_window_validated() {
        let err = AccessPolicy::from_yaml(
            r#"
version: "1"
rules:
  - name: night-shift
    effect: allow
    conditions:
      time:
        hours: { start: "22:00", end: "06:00" }
        timezone: UTC
"#,
        );
        assert!(matches!(err, Err(PolicyError::WraparoundHours { .. })));
    }
}
