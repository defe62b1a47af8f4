use serde::{Deserialize, Serialize};

/// The terminal effect of a policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
    RequireApproval,
}

/// How the issuer was invoked. Rules carrying `require_server_session`
/// only honor their effect in [`EvalMode::Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    Standard,
    Server,
}

/// The typed output of policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub effect: Effect,
    pub rule_name: String,
    /// Index of the matching rule in source order, or -1 for default deny.
    pub rule_index: i32,
    pub reason: String,
    pub matched_at: jiff::Timestamp,
}

impl Decision {
    /// The decision when no rule matched.
    pub fn default_deny(now: jiff::Timestamp) -> Self {
        Self {
            effect: Effect::Deny,
            rule_name: String::new(),
            rule_index: -1,
            reason: "no matching rule".to_string(),
            matched_at: now,
        }
    }
}
