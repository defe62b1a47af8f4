use thiserror::Error;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("access denied by rule {rule:?}: {reason}")]
    Denied { rule: String, reason: String },

    #[error("profile {profile} requires an approved request and none was found")]
    ApprovalRequired { profile: String },

    #[error("break-glass event {id} is not usable: {reason}")]
    BreakGlassUnusable { id: String, reason: String },

    #[error("already inside a Sentinel session for profile {profile}")]
    NestedIssuance { profile: String },

    #[error("unknown profile: {profile}")]
    UnknownProfile { profile: String },

    #[error("profile configuration error: {0}")]
    ProfileConfig(String),

    #[error("session recording failed, credentials withheld: {0}")]
    SessionRecord(#[source] sentinel_store::StoreError),

    #[error("rule {rule:?} requires a tracked server session and the session store is disabled")]
    SessionStoreRequired { rule: String },

    #[error("decision log error: {0}")]
    DecisionLog(String),

    #[error("decision log line {line} failed verification")]
    DecisionLogTampered { line: usize },

    #[error("STS error: {0}")]
    Sts(String),

    #[error(transparent)]
    Policy(#[from] sentinel_policy::PolicyError),

    #[error(transparent)]
    Store(#[from] sentinel_store::StoreError),

    #[error(transparent)]
    Core(#[from] sentinel_core::error::CoreError),
}
