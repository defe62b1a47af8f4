use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::model::POLICY_VERSION;

/// Who may resolve approval requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalPolicy {
    pub version: String,
    /// Canonical usernames allowed to approve or deny requests.
    #[serde(default)]
    pub approvers: Vec<String>,
    /// Whether a requester may resolve their own request. Off by default.
    #[serde(default)]
    pub allow_self_approval: bool,
}

impl ApprovalPolicy {
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let policy: ApprovalPolicy = serde_yaml::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version != POLICY_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                got: self.version.clone(),
            });
        }
        Ok(())
    }

    pub fn is_approver(&self, user: &str) -> bool {
        self.approvers.iter().any(|a| a == user)
    }

    /// Whether `approver` may resolve a request raised by `requester`.
    pub fn may_resolve(&self, approver: &str, requester: &str) -> bool {
        self.is_approver(approver) && (self.allow_self_approval || approver != requester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_approval_off_by_default() {
        let p = ApprovalPolicy::from_yaml("version: \"1\"\napprovers: [alice, bob]\n").unwrap();
        assert!(p.may_resolve("alice", "bob"));
        assert!(!p.may_resolve("alice", "alice"));
        assert!(!p.may_resolve("mallory", "bob"));
    }

    #[test]
    fn self_approval_opt_in() {
        let p = ApprovalPolicy::from_yaml(
            "version: \"1\"\napprovers: [alice]\nallow_self_approval: true\n",
        )
        .unwrap();
        assert!(p.may_resolve("alice", "alice"));
    }
}
